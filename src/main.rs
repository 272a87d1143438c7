//! Command line front end of `pdf_signer`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use log::info;
use ::pdf_signer::{
    pdf_signer, AddFieldParameters, PdfSigner, PdfVisualSigner, Rectangle, SignDigitalParameters,
    SignFieldParameters, SignVisualParameters, SignatureComputerSettings, SignatureParameters,
    SignatureSettings, SignatureText, SignerSettings, VisualParameters,
};

#[derive(Parser)]
#[command(name = "pdf-signer")]
#[command(about = "Incremental PDF signing with detached PKCS #7 signatures")]
#[command(long_about = "
Adds signature fields to PDF documents, signs them and checks the integrity of
existing signatures. Every change is appended as an incremental update.

EXAMPLES:
    pdf-signer sign in.pdf -o out.pdf --p12 signer.p12 --page 1 --reason Approved
    pdf-signer add-field in.pdf -o out.pdf --page 2 --name Approval
    pdf-signer sign-field out.pdf -o signed.pdf --p12 signer.p12 --field Approval
    pdf-signer verify signed.pdf

ENVIRONMENT VARIABLES:
    PDF_SIGNER_PASSWORD  Password of the PKCS #12 file or PEM key
    RUST_LOG             Logging level (debug, info, warn, error)
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a signature field holding an unfilled placeholder
    AddPlaceholder {
        #[command(flatten)]
        io: InputOutput,
        #[command(flatten)]
        field: NewField,
        #[command(flatten)]
        signature: SignatureArgs,
        #[command(flatten)]
        visual: VisualArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Add an empty signature field
    AddField {
        #[command(flatten)]
        io: InputOutput,
        #[command(flatten)]
        field: NewField,
        /// Field rectangle as left,top,right,bottom
        #[arg(long, value_parser = parse_rectangle, allow_hyphen_values = true)]
        rect: Option<Rectangle>,
    },

    /// Add a signature field and sign it
    Sign {
        #[command(flatten)]
        io: InputOutput,
        #[command(flatten)]
        field: NewField,
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        signature: SignatureArgs,
        #[command(flatten)]
        visual: VisualArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Sign an existing empty signature field
    SignField {
        #[command(flatten)]
        io: InputOutput,
        /// Name of the field to sign
        #[arg(long)]
        field: String,
        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        signature: SignatureArgs,
        #[command(flatten)]
        visual: VisualArgs,
        #[command(flatten)]
        settings: SettingsArgs,
    },

    /// Draw an image and texts into a page, without a digital signature
    SignVisual {
        #[command(flatten)]
        io: InputOutput,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Flip the page vertically before drawing
        #[arg(long)]
        reverse_y: bool,
        /// Resource name of the background image
        #[arg(long)]
        background_name: Option<String>,
        #[command(flatten)]
        visual: VisualArgs,
    },

    /// Check the integrity of the signatures, printed as JSON
    Verify {
        #[arg(value_name = "INPUT_FILE")]
        input: PathBuf,
    },

    /// List the empty signature fields, printed as JSON
    Fields {
        #[arg(value_name = "INPUT_FILE")]
        input: PathBuf,
    },
}

#[derive(Args)]
struct InputOutput {
    #[arg(value_name = "INPUT_FILE")]
    input: PathBuf,
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct NewField {
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Field name, Signature{n} by default
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct KeyArgs {
    /// PKCS #12 file with the signing key and certificate
    #[arg(long, conflicts_with_all = ["cert", "key"], required_unless_present = "cert")]
    p12: Option<PathBuf>,
    /// PEM certificate
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,
    /// PEM private key, possibly encrypted
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
    #[arg(long, env = "PDF_SIGNER_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct SignatureArgs {
    /// Signer name stored in the signature
    #[arg(long)]
    signer_name: Option<String>,
    #[arg(long)]
    reason: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    contact_info: Option<String>,
    /// Signing time in RFC 3339, now by default
    #[arg(long)]
    date: Option<DateTime<Utc>>,
}

#[derive(Args)]
struct VisualArgs {
    /// Rectangle as left,top,right,bottom; negative values are measured from
    /// the right and bottom edges
    #[arg(long, value_parser = parse_rectangle, allow_hyphen_values = true)]
    rectangle: Option<Rectangle>,
    /// JPEG or PNG background
    #[arg(long)]
    background: Option<PathBuf>,
    /// Large text lines, at most two are drawn
    #[arg(long = "title")]
    titles: Vec<String>,
    /// Small text lines, at most four are drawn
    #[arg(long = "line")]
    lines: Vec<String>,
}

#[derive(Args)]
struct SettingsArgs {
    /// Hex digits reserved for the signature
    #[arg(long, default_value_t = SignatureSettings::default().signature_length)]
    signature_length: usize,
}

fn parse_rectangle(value: &str) -> std::result::Result<Rectangle, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| e.to_string()))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match parts[..] {
        [left, top, right, bottom] => Ok(Rectangle::new(left, top, right, bottom)),
        _ => Err("expected left,top,right,bottom".to_owned()),
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write(path: &Path, pdf: &[u8]) -> Result<()> {
    fs::write(path, pdf).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("wrote {} bytes to {}", pdf.len(), path.display());
    Ok(())
}

impl KeyArgs {
    fn settings(&self) -> Result<SignatureComputerSettings> {
        match (&self.p12, &self.cert, &self.key) {
            (Some(p12), _, _) => Ok(SignatureComputerSettings::P12 {
                certificate: read(p12)?,
                password: self.password.clone(),
            }),
            (None, Some(cert), Some(key)) => Ok(SignatureComputerSettings::Pem {
                certificate: fs::read_to_string(cert)
                    .with_context(|| format!("Failed to read {}", cert.display()))?,
                key: fs::read_to_string(key)
                    .with_context(|| format!("Failed to read {}", key.display()))?,
                password: self.password.clone(),
            }),
            _ => bail!("Either --p12 or both --cert and --key are required"),
        }
    }
}

impl SignatureArgs {
    fn parameters(self) -> SignatureParameters {
        SignatureParameters {
            name: self.signer_name,
            location: self.location,
            reason: self.reason,
            date: self.date,
            contact_info: self.contact_info,
        }
    }
}

impl VisualArgs {
    fn texts(&self) -> Option<Vec<SignatureText>> {
        if self.titles.is_empty() && self.lines.is_empty() {
            return None;
        }
        Some(vec![
            SignatureText::new(self.titles.iter().cloned()),
            SignatureText::new(self.lines.iter().cloned()),
        ])
    }

    fn background(&self) -> Result<Option<Vec<u8>>> {
        self.background.as_deref().map(read).transpose()
    }

    fn parameters(&self) -> Result<Option<VisualParameters>> {
        let visual = VisualParameters {
            rectangle: self.rectangle,
            background: self.background()?,
            texts: self.texts(),
        };
        Ok((visual != VisualParameters::default()).then_some(visual))
    }
}

impl SettingsArgs {
    fn settings(&self) -> SignatureSettings {
        SignatureSettings {
            signature_length: self.signature_length,
            ..Default::default()
        }
    }
}

fn signer(key: &KeyArgs, settings: &SettingsArgs) -> Result<PdfSigner> {
    let settings = SignerSettings {
        signature: settings.settings(),
        signature_computer: key.settings()?,
    };
    PdfSigner::new(&settings).context("Failed to load the signing key")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Commands::AddPlaceholder {
            io,
            field,
            signature,
            visual,
            settings,
        } => {
            let info = SignDigitalParameters {
                page_number: field.page,
                name: field.name,
                signature: Some(signature.parameters()),
                visual: visual.parameters()?,
            };
            let pdf = pdf_signer::add_placeholder(&read(&io.input)?, &info, &settings.settings())?;
            write(&io.output, &pdf)
        }
        Commands::AddField { io, field, rect } => {
            let info = AddFieldParameters {
                page_number: field.page,
                name: field.name,
                rectangle: rect,
            };
            let pdf = pdf_signer::add_field(&read(&io.input)?, &info)?;
            write(&io.output, &pdf)
        }
        Commands::Sign {
            io,
            field,
            key,
            signature,
            visual,
            settings,
        } => {
            let info = SignDigitalParameters {
                page_number: field.page,
                name: field.name,
                signature: Some(signature.parameters()),
                visual: visual.parameters()?,
            };
            let pdf = signer(&key, &settings)?.sign(&read(&io.input)?, &info)?;
            write(&io.output, &pdf)
        }
        Commands::SignField {
            io,
            field,
            key,
            signature,
            visual,
            settings,
        } => {
            let info = SignFieldParameters {
                field_name: field,
                signature: Some(signature.parameters()),
                visual: visual.parameters()?,
            };
            let pdf = signer(&key, &settings)?.sign_field(&read(&io.input)?, &info)?;
            write(&io.output, &pdf)
        }
        Commands::SignVisual {
            io,
            page,
            reverse_y,
            background_name,
            visual,
        } => {
            let info = SignVisualParameters {
                page_number: page,
                rectangle: visual.rectangle.unwrap_or_default(),
                reverse_y,
                background: visual.background()?,
                texts: visual.texts(),
                background_name,
            };
            let pdf = PdfVisualSigner.sign(&read(&io.input)?, &info)?;
            write(&io.output, &pdf)
        }
        Commands::Verify { input } => print_json(&pdf_signer::verify_signatures(&read(&input)?)?),
        Commands::Fields { input } => print_json(&pdf_signer::get_fields(&read(&input)?)?),
    }
}
