//! Visual signatures drawn straight into page content.

use log::debug;
use lopdf::Dictionary;

use crate::appearance::{page_drawing_content, PagePlacement};
use crate::models::SignatureText;
use crate::rectangle::{compute_absolute_page_reverse_rectangle, Rectangle};
use crate::signing_document::SigningDocument;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct AddVisualSignatureParameters<'p> {
    pub page_index: usize,
    pub rectangle: Rectangle,
    pub background: Option<&'p [u8]>,
    pub texts: Option<&'p [SignatureText]>,
    pub reverse_y: bool,
    /// Resource name of the background, `SignatureBackground-{k}` by
    /// default.
    pub background_name: Option<&'p str>,
}

pub struct PdfDocumentVisualSigner<'a> {
    signing_doc: SigningDocument<'a>,
}

impl<'a> PdfDocumentVisualSigner<'a> {
    pub fn from_pdf(pdf: &'a [u8]) -> Result<Self> {
        Ok(Self {
            signing_doc: SigningDocument::load(pdf)?,
        })
    }

    pub fn signing_document(&self) -> &SigningDocument<'a> {
        &self.signing_doc
    }

    /// Draws a background image and texts on a page.
    ///
    /// Does nothing without a background and texts. Documents with signature
    /// fields are refused, since the drawing would invalidate them.
    pub fn add_visual_signature(&mut self, parameters: AddVisualSignatureParameters) -> Result<()> {
        let AddVisualSignatureParameters {
            page_index,
            rectangle,
            background,
            texts,
            reverse_y,
            background_name,
        } = parameters;

        if background.is_none() && texts.is_none() {
            return Ok(());
        }
        if self.signing_doc.get_signature_count()? > 0 {
            return Err(Error::DigitallySigned);
        }

        let background_name = match background_name {
            Some(name) => name.to_owned(),
            None => self.free_background_name(page_index)?,
        };

        let page_size = self.signing_doc.get_page_size(page_index)?;
        let page_rect = compute_absolute_page_reverse_rectangle(Some(&rectangle), page_size);
        let placement = PagePlacement {
            left: page_rect.left,
            bottom: page_rect.bottom,
            width: page_rect.right - page_rect.left,
            height: page_rect.bottom - page_rect.top,
            flip_height: reverse_y.then_some(page_size.height),
        };

        let image = background
            .map(|background| self.signing_doc.embed_image(background))
            .transpose()?;

        let content = page_drawing_content(
            &placement,
            image.map(|_| background_name.as_str()),
            texts,
        );
        let drawing = self.signing_doc.register_stream(content, Dictionary::new());
        self.signing_doc.add_page_content(drawing, page_index)?;
        if let Some(image) = image {
            self.signing_doc
                .add_page_resource(image, page_index, &background_name)?;
        }
        if texts.is_some() {
            self.signing_doc.embed_signature_font(page_index)?;
        }

        debug!("drew visual signature on page {}", page_index + 1);
        Ok(())
    }

    pub fn save(&self) -> Result<Vec<u8>> {
        self.signing_doc.save()
    }

    /// The first `SignatureBackground-{k}` not yet used by the page.
    fn free_background_name(&self, page_index: usize) -> Result<String> {
        let page = self.signing_doc.get_page_id(page_index)?;
        let doc = self.signing_doc.document();
        let xobjects = self
            .signing_doc
            .get_dictionary(page)?
            .get_deref(b"Resources", doc)
            .and_then(|resources| resources.as_dict())
            .and_then(|resources| resources.get_deref(b"XObject", doc))
            .and_then(|xobjects| xobjects.as_dict())
            .ok();

        Ok((1..)
            .map(|k| format!("SignatureBackground-{k}"))
            .find(|name| !xobjects.is_some_and(|x| x.has(name.as_bytes())))
            .unwrap_or_default())
    }
}
