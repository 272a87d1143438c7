//! Signature fields, placeholders and widget appearances.

use log::debug;
use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};

use crate::appearance::{
    background_form_content, signature_appearance_content, APPEARANCE_HEIGHT, APPEARANCE_WIDTH,
};
use crate::byte_range::PdfByteRanges;
use crate::models::{SignatureParameters, SignatureText};
use crate::pdf_string::{format_date, text_string};
use crate::rectangle::{compute_absolute_page_reverse_rectangle, Rectangle};
use crate::settings::SignatureSettings;
use crate::signing_document::SigningDocument;
use crate::{Error, Result};

/// Names given to the objects of the n-th signature of a document.
#[derive(Debug, Clone, Copy)]
struct NameProvider {
    signature_number: usize,
}

impl NameProvider {
    fn form_name(&self) -> String {
        format!("frm{}", self.signature_number)
    }

    fn background_name(&self) -> String {
        format!("background{}", self.signature_number)
    }

    fn signature_name(&self) -> String {
        format!("Signature{}", self.signature_number)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddSignatureFieldParameters {
    /// Defaults to `Signature{n}`.
    pub name: Option<String>,
    pub page_index: usize,
    pub rectangle: Option<Rectangle>,
    /// Normal appearance of the widget.
    pub visual: Option<ObjectId>,
    /// Signature dictionary stored as the field value.
    pub placeholder: Option<ObjectId>,
    pub embed_font: bool,
}

fn appearance_bounding_box() -> Object {
    Object::Array(vec![
        Object::Real(0.0),
        Object::Real(0.0),
        Object::Real(APPEARANCE_WIDTH as f32),
        Object::Real(APPEARANCE_HEIGHT as f32),
    ])
}

/// Prepares a document for a digital signature.
pub struct PdfDocumentDigitalSigner<'a> {
    signing_doc: SigningDocument<'a>,
    names: NameProvider,
}

impl<'a> PdfDocumentDigitalSigner<'a> {
    pub fn from_pdf(pdf: &'a [u8]) -> Result<Self> {
        Ok(Self::new(SigningDocument::load(pdf)?))
    }

    pub fn new(signing_doc: SigningDocument<'a>) -> Self {
        let signature_number = signing_doc.get_signature_count().unwrap_or(0) + 1;
        Self {
            signing_doc,
            names: NameProvider { signature_number },
        }
    }

    pub fn signing_document(&self) -> &SigningDocument<'a> {
        &self.signing_doc
    }

    /// Adds a signature widget to a page and to the form.
    pub fn add_signature_field(&mut self, parameters: AddSignatureFieldParameters) -> Result<ObjectId> {
        let AddSignatureFieldParameters {
            name,
            page_index,
            rectangle,
            visual,
            placeholder,
            embed_font,
        } = parameters;

        self.signing_doc.ensure_acro_form()?;
        self.signing_doc.ensure_page_annots(page_index)?;

        let name = name.unwrap_or_else(|| self.names.signature_name());
        let page_size = self.signing_doc.get_page_size(page_index)?;
        let page_rect = compute_absolute_page_reverse_rectangle(rectangle.as_ref(), page_size);

        let mut field = dictionary! {
            "FT" => "Sig",
            "Type" => "Annot",
            "Subtype" => "Widget",
            "T" => text_string(&name),
            "F" => Object::Integer(132),
            "P" => Object::Reference(self.signing_doc.get_page_id(page_index)?),
            "Rect" => Object::Array(
                [page_rect.left, page_rect.top, page_rect.right, page_rect.bottom]
                    .into_iter()
                    .map(|v| Object::Real(v as f32))
                    .collect()
            ),
        };
        if let Some(visual) = visual {
            field.set("AP", dictionary! { "N" => Object::Reference(visual) });
        }
        if let Some(placeholder) = placeholder {
            field.set("V", Object::Reference(placeholder));
        }

        let field = self.signing_doc.register_object(field);
        self.signing_doc.add_page_annot(page_index, field)?;
        self.signing_doc.add_form_field(field)?;
        if embed_font {
            self.signing_doc.embed_signature_font(page_index)?;
        }

        debug!("added signature field {name:?} on page {}", page_index + 1);
        Ok(field)
    }

    /// Creates the widget appearance. Returns `None` when there is nothing
    /// to draw.
    pub fn add_visual(
        &mut self,
        background: Option<&[u8]>,
        texts: Option<&[SignatureText]>,
    ) -> Result<Option<ObjectId>> {
        if background.is_none() && texts.is_none() {
            return Ok(None);
        }

        let form = match background {
            Some(background) => {
                let image = self.signing_doc.embed_image(background)?;
                let background_name = self.names.background_name();
                let mut xobjects = Dictionary::new();
                xobjects.set(background_name.as_str(), Object::Reference(image));
                let form = self.signing_doc.register_stream(
                    background_form_content(&background_name),
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => appearance_bounding_box(),
                        "Resources" => dictionary! { "XObject" => xobjects },
                    },
                );
                Some(form)
            }
            None => None,
        };

        let form_name = self.names.form_name();
        let mut resources = Dictionary::new();
        if let Some(form) = form {
            let mut xobjects = Dictionary::new();
            xobjects.set(form_name.as_str(), Object::Reference(form));
            resources.set("XObject", xobjects);
        }

        let content = signature_appearance_content(form.map(|_| form_name.as_str()), texts);
        let visual = self.signing_doc.register_stream(
            content,
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => appearance_bounding_box(),
                "Resources" => resources,
            },
        );
        Ok(Some(visual))
    }

    /// Adds a signature dictionary whose `/Contents` and `/ByteRange` are
    /// placeholders sized by `settings`.
    pub fn add_signature_placeholder(
        &mut self,
        signature: &SignatureParameters,
        settings: &SignatureSettings,
    ) -> Result<ObjectId> {
        settings.validate()?;
        let range = Object::Integer(settings.range_placeholder as i64);

        let mut placeholder = dictionary! {
            "Type" => "Sig",
            "Filter" => "Adobe.PPKLite",
            "SubFilter" => "adbe.pkcs7.detached",
            // Written as `signature_length` hex digits `A`.
            "Contents" => Object::String(vec![0xAA; settings.signature_length / 2], StringFormat::Hexadecimal),
            "ByteRange" => Object::Array(vec![Object::Integer(0), range.clone(), range.clone(), range]),
        };
        if let Some(name) = &signature.name {
            placeholder.set("Name", text_string(name));
        }
        if let Some(location) = &signature.location {
            placeholder.set("Location", text_string(location));
        }
        if let Some(reason) = &signature.reason {
            placeholder.set("Reason", text_string(reason));
        }
        if let Some(date) = &signature.date {
            placeholder.set("M", Object::string_literal(format_date(date)));
        }
        if let Some(contact_info) = &signature.contact_info {
            placeholder.set("ContactInfo", text_string(contact_info));
        }

        Ok(self.signing_doc.register_object(placeholder))
    }

    /// Stores `placeholder` as the value of the unsigned field `name` and
    /// replaces its appearance.
    pub fn update_signature(
        &mut self,
        name: &str,
        placeholder: ObjectId,
        visual: Option<ObjectId>,
        embed_font: bool,
    ) -> Result<()> {
        let field = self.signing_doc.get_signature(name)?;
        if self.signing_doc.has_signature_value(field) {
            return Err(Error::AlreadySigned(name.to_owned()));
        }

        self.signing_doc
            .get_dictionary_mut(field)?
            .set("V", Object::Reference(placeholder));
        self.signing_doc.set_normal_appearance(field, visual)?;

        if embed_font {
            let page = self
                .signing_doc
                .get_dictionary(field)?
                .get(b"P")?
                .as_reference()?;
            self.signing_doc.embed_signature_font_on(page)?;
        }
        Ok(())
    }

    pub fn get_placeholder_ranges(&self) -> Result<PdfByteRanges> {
        self.signing_doc.get_placeholder_ranges()
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        self.signing_doc.save()
    }
}
