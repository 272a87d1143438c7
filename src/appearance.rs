//! Content streams drawing signature backgrounds and texts.

use crate::models::SignatureText;
use crate::pdf_string::escape_content_text;

/// Side of the signature appearance box.
pub(crate) const APPEARANCE_WIDTH: f64 = 214.0;
pub(crate) const APPEARANCE_HEIGHT: f64 = 70.0;

/// Where a visual signature lands on the page, in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PagePlacement {
    pub(crate) left: f64,
    pub(crate) bottom: f64,
    pub(crate) width: f64,
    pub(crate) height: f64,
    /// Page height to mirror the page vertically around, if any.
    pub(crate) flip_height: Option<f64>,
}

fn line(texts: &[SignatureText], block: usize, line: usize) -> &str {
    texts
        .get(block)
        .and_then(|text| text.lines.get(line))
        .map_or("", String::as_str)
}

fn show_text(out: &mut Vec<u8>, text: &str) {
    out.extend_from_slice(b" (");
    out.extend_from_slice(&escape_content_text(text));
    out.extend_from_slice(b")Tj");
}

/// Two large lines from the first block, four small ones from the second.
fn text_block(out: &mut Vec<u8>, texts: &[SignatureText]) {
    out.extend_from_slice(b" BT /Helvetica 1 Tf 0 Tc 0 Tw 0 Ts 100 Tz 0 Tr");
    out.extend_from_slice(b" 27.849 0 0 27.849 1 43.646 Tm");
    show_text(out, line(texts, 0, 0));
    out.extend_from_slice(b" 0 -1.2 TD");
    show_text(out, line(texts, 0, 1));
    out.extend_from_slice(b" 12.637 0 0 12.637 109.1188 54.087 Tm");
    show_text(out, line(texts, 1, 0));
    for i in 1..4 {
        out.extend_from_slice(b" T*");
        show_text(out, line(texts, 1, i));
    }
    out.extend_from_slice(b" ET Q");
}

/// Content of the form XObject wrapping a background image.
pub(crate) fn background_form_content(background_name: &str) -> Vec<u8> {
    format!("q 1 0 0 1 0 0 cm /{background_name} Do Q").into_bytes()
}

/// Content of a widget appearance: the scaled background form followed by
/// the texts.
pub(crate) fn signature_appearance_content(
    form_name: Option<&str>,
    texts: Option<&[SignatureText]>,
) -> Vec<u8> {
    let mut out = match form_name {
        Some(name) => {
            format!("q {APPEARANCE_WIDTH} 0 0 {APPEARANCE_HEIGHT} 0 0 cm /{name} Do Q").into_bytes()
        }
        None => Vec::new(),
    };
    if let Some(texts) = texts {
        out.extend_from_slice(b" q 0 0 106 68 re");
        text_block(&mut out, texts);
    }
    out
}

/// Content appended to a page for a visual signature.
pub(crate) fn page_drawing_content(
    placement: &PagePlacement,
    background_name: Option<&str>,
    texts: Option<&[SignatureText]>,
) -> Vec<u8> {
    let flip = placement
        .flip_height
        .map(|height| format!(" 1 0 0 -1 0 {height} cm"))
        .unwrap_or_default();
    let PagePlacement {
        left,
        bottom,
        width,
        height,
        ..
    } = *placement;

    let mut out = Vec::new();
    if let Some(name) = background_name {
        out.extend_from_slice(
            format!(
                "q{flip} 1 0 0 -1 {left} {bottom} cm 1 0 0 1 0 0 cm \
                 {width} 0 0 {height} 0 0 cm 1 0 0 1 0 0 cm /{name} Do Q"
            )
            .as_bytes(),
        );
    }
    if let Some(texts) = texts {
        out.extend_from_slice(format!(" q{flip} 0 0 106 68 re 1 0 0 1 {left} {bottom} cm").as_bytes());
        text_block(&mut out, texts);
    }
    out
}
