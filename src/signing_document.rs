//! A loaded PDF prepared for incremental signing updates.

use indexmap::IndexSet;
use log::{debug, trace};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::byte_range::{self, PdfByteRanges};
use crate::models::SignatureDetails;
use crate::pdf_string::{decode_text_string, parse_date};
use crate::raster::image_xobject;
use crate::rectangle::Size;
use crate::writer::IncrementalWriter;
use crate::{Error, ExactArrayOrNone, Result};

/// Bound on `/Parent` and reference chains.
const MAX_DEPTH: usize = 64;

/// A value reached from an indirect object through direct dictionaries.
///
/// Mutating the value means the `owner` must be written again.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    owner: ObjectId,
    path: Vec<&'static [u8]>,
}

impl Location {
    fn root(owner: ObjectId) -> Self {
        Self {
            owner,
            path: Vec::new(),
        }
    }

    fn child(&self, key: &'static [u8]) -> Self {
        let mut path = self.path.clone();
        path.push(key);
        Self {
            owner: self.owner,
            path,
        }
    }
}

fn as_dict(object: &Object) -> Result<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Ok(dict),
        Object::Stream(stream) => Ok(&stream.dict),
        _ => Err(lopdf::Error::Type.into()),
    }
}

fn as_dict_mut(object: &mut Object) -> Result<&mut Dictionary> {
    match object {
        Object::Dictionary(dict) => Ok(dict),
        Object::Stream(stream) => Ok(&mut stream.dict),
        _ => Err(lopdf::Error::Type.into()),
    }
}

/// The original bytes of a PDF together with its parsed object graph.
///
/// Objects registered or marked as changed are written, in that order, by
/// [`SigningDocument::save`] after the untouched original bytes.
pub struct SigningDocument<'a> {
    doc: Document,
    pdf: &'a [u8],
    pages: Vec<ObjectId>,
    changed: IndexSet<ObjectId>,
}

impl<'a> SigningDocument<'a> {
    pub fn load(pdf: &'a [u8]) -> Result<Self> {
        let mut doc = Document::load_mem(pdf)?;
        if doc.trailer.has(b"Encrypt") {
            return Err(Error::EncryptedDocument);
        }

        // New objects must not reuse numbers of the previous sections.
        let size = doc.trailer.get(b"Size").and_then(Object::as_i64).unwrap_or(0);
        let highest = doc.objects.keys().map(|&(number, _)| number).max().unwrap_or(0);
        doc.max_id = doc
            .max_id
            .max(highest)
            .max(u32::try_from(size - 1).unwrap_or(0));

        let pages = doc.get_pages().into_values().collect();

        Ok(Self {
            doc,
            pdf,
            pages,
            changed: IndexSet::new(),
        })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The bytes the document was loaded from.
    pub fn pdf(&self) -> &'a [u8] {
        self.pdf
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn get_page_id(&self, page_index: usize) -> Result<ObjectId> {
        self.pages
            .get(page_index)
            .copied()
            .ok_or(Error::PageNotFound(page_index + 1))
    }

    pub fn get_page_size(&self, page_index: usize) -> Result<Size> {
        let page = self.get_page_id(page_index)?;
        let media_box = self
            .inherited_attribute(page, b"MediaBox")?
            .ok_or(lopdf::Error::DictKey)?
            .as_array()?
            .iter()
            .map(|v| self.doc.dereference(v).and_then(|(_, v)| v.as_float()))
            .collect::<lopdf::Result<ExactArrayOrNone<f32, 4>>>()?
            .0
            .ok_or(lopdf::Error::Type)?;

        Ok(Size {
            width: f64::from(media_box[2] - media_box[0]),
            height: f64::from(media_box[3] - media_box[1]),
        })
    }

    pub fn get_dictionary(&self, id: ObjectId) -> Result<&Dictionary> {
        as_dict(self.doc.get_object(id)?)
    }

    /// Mutable access to an object's dictionary. The caller is responsible
    /// for [`mark_object_changed`](Self::mark_object_changed).
    pub fn get_dictionary_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary> {
        as_dict_mut(self.doc.get_object_mut(id)?)
    }

    /// Adds a new indirect object, always included by [`save`](Self::save).
    pub fn register_object(&mut self, object: impl Into<Object>) -> ObjectId {
        let id = self.doc.add_object(object);
        self.changed.insert(id);
        id
    }

    pub fn register_stream(&mut self, content: Vec<u8>, dict: Dictionary) -> ObjectId {
        self.register_object(Stream::new(dict, content))
    }

    /// Records that an existing object was modified in place.
    pub fn mark_object_changed(&mut self, id: ObjectId) {
        self.changed.insert(id);
    }

    pub fn ensure_acro_form(&mut self) -> Result<()> {
        self.acro_form().map(|_| ())
    }

    pub fn ensure_page_annots(&mut self, page_index: usize) -> Result<()> {
        self.page_annots(page_index).map(|_| ())
    }

    pub fn ensure_page_contents_array(&mut self, page_index: usize) -> Result<()> {
        self.page_contents(page_index).map(|_| ())
    }

    pub fn ensure_page_resources_xobject(&mut self, page_index: usize) -> Result<()> {
        self.page_xobjects(page_index).map(|_| ())
    }

    pub fn add_page_annot(&mut self, page_index: usize, annot: ObjectId) -> Result<()> {
        let annots = self.page_annots(page_index)?;
        self.push_reference(&annots, annot)
    }

    pub fn add_form_field(&mut self, field: ObjectId) -> Result<()> {
        let acro_form = self.acro_form()?;
        let fields = self.child_or_insert(&acro_form, b"Fields", || Object::Array(Vec::new()))?;
        self.push_reference(&fields, field)
    }

    pub fn add_page_content(&mut self, content: ObjectId, page_index: usize) -> Result<()> {
        let contents = self.page_contents(page_index)?;
        self.push_reference(&contents, content)
    }

    pub fn add_page_resource(&mut self, resource: ObjectId, page_index: usize, name: &str) -> Result<()> {
        let xobjects = self.page_xobjects(page_index)?;
        as_dict_mut(self.object_at_mut(&xobjects)?)?.set(name, Object::Reference(resource));
        self.changed.insert(xobjects.owner);
        Ok(())
    }

    /// Embeds a JPEG or PNG image as an image XObject.
    pub fn embed_image(&mut self, bytes: &[u8]) -> Result<ObjectId> {
        let mut xobject = image_xobject(bytes).ok_or(Error::InvalidImage)?;
        if let Some(soft_mask) = xobject.soft_mask {
            let soft_mask = self.register_object(soft_mask);
            xobject.image.dict.set("SMask", Object::Reference(soft_mask));
        }
        Ok(self.register_object(xobject.image))
    }

    pub fn embed_signature_font(&mut self, page_index: usize) -> Result<()> {
        let page = self.get_page_id(page_index)?;
        self.embed_signature_font_on(page)
    }

    /// Ensures the page resources hold a Helvetica font named `Helvetica`.
    pub fn embed_signature_font_on(&mut self, page: ObjectId) -> Result<()> {
        let resources = self.page_resources(page)?;
        let fonts = self.child_or_insert(&resources, b"Font", || {
            Object::Dictionary(Dictionary::new())
        })?;
        if as_dict(self.object_at(&fonts)?)?.has(b"Helvetica") {
            return Ok(());
        }

        let font = self.register_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        as_dict_mut(self.object_at_mut(&fonts)?)?.set("Helvetica", Object::Reference(font));
        self.changed.insert(fonts.owner);
        Ok(())
    }

    /// Sets or removes the normal appearance of a field.
    pub fn set_normal_appearance(&mut self, field: ObjectId, visual: Option<ObjectId>) -> Result<()> {
        let field_location = Location::root(field);
        match visual {
            Some(visual) => {
                let appearance = self.child_or_insert(&field_location, b"AP", || {
                    Object::Dictionary(Dictionary::new())
                })?;
                as_dict_mut(self.object_at_mut(&appearance)?)?.set("N", Object::Reference(visual));
                self.changed.insert(appearance.owner);
            }
            None => {
                self.get_dictionary_mut(field)?.remove(b"AP");
            }
        }
        self.changed.insert(field);
        Ok(())
    }

    /// Signature fields of `/AcroForm /Fields`, in array order.
    pub fn get_signatures(&self) -> Result<Vec<ObjectId>> {
        let Some(acro_form) = self.acro_form_location()? else {
            return Ok(Vec::new());
        };
        let Some(fields) = self.child(&acro_form, b"Fields")? else {
            return Ok(Vec::new());
        };

        Ok(self
            .object_at(&fields)?
            .as_array()?
            .iter()
            .filter_map(|field| field.as_reference().ok())
            .filter(|&id| {
                self.get_dictionary(id)
                    .map(|dict| self.is_signature(dict))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Signature fields without a value.
    pub fn get_fields(&self) -> Result<Vec<ObjectId>> {
        let mut fields = self.get_signatures()?;
        fields.retain(|&id| !self.has_signature_value(id));
        Ok(fields)
    }

    /// First signature field named `name`.
    pub fn get_signature(&self, name: &str) -> Result<ObjectId> {
        for id in self.get_signatures()? {
            if self.get_signature_name(id).is_ok_and(|n| n == name) {
                return Ok(id);
            }
        }
        Err(Error::SignatureNotFound(name.to_owned()))
    }

    /// The 1-based number of the first page with an annotation named `name`.
    pub fn get_signature_page_number(&self, name: &str) -> Result<usize> {
        for (index, &page) in self.pages.iter().enumerate() {
            let Ok(annots) = self
                .get_dictionary(page)?
                .get_deref(b"Annots", &self.doc)
                .and_then(Object::as_array)
            else {
                continue;
            };

            for annot in annots {
                let Ok((_, Object::Dictionary(annot))) = self.doc.dereference(annot) else {
                    continue;
                };
                let title = annot.get_deref(b"T", &self.doc).and_then(Object::as_str);
                if title.is_ok_and(|t| decode_text_string(t) == name) {
                    return Ok(index + 1);
                }
            }
        }
        Err(Error::SignatureNotFound(name.to_owned()))
    }

    pub fn get_signature_count(&self) -> Result<usize> {
        Ok(self.get_signatures()?.len())
    }

    pub fn get_signature_name(&self, field: ObjectId) -> Result<String> {
        let title = self
            .get_dictionary(field)?
            .get_deref(b"T", &self.doc)?
            .as_str()?;
        Ok(decode_text_string(title))
    }

    pub fn has_signature_value(&self, field: ObjectId) -> bool {
        self.get_dictionary(field)
            .map(|dict| dict.has(b"V"))
            .unwrap_or(false)
    }

    /// Ranges of the last signature field.
    pub fn get_placeholder_ranges(&self) -> Result<PdfByteRanges> {
        let last = *self.get_signatures()?.last().ok_or(Error::NoPlaceholder)?;
        self.get_signature_ranges(last)
    }

    /// Ranges declared by the `/ByteRange` of a field's signature value.
    pub fn get_signature_ranges(&self, field: ObjectId) -> Result<PdfByteRanges> {
        let value = self.signature_value(field)?;
        let byte_range = value
            .get_deref(b"ByteRange", &self.doc)?
            .as_array()?
            .iter()
            .map(|r| self.doc.dereference(r).and_then(|(_, r)| r.as_i64()))
            .collect::<lopdf::Result<ExactArrayOrNone<i64, 4>>>()?
            .0
            .ok_or(lopdf::Error::Type)?;

        PdfByteRanges::from_byte_range(byte_range)
    }

    /// The bytes covered by a field's signature.
    pub fn get_signature_buffer(&self, field: ObjectId) -> Result<Vec<u8>> {
        self.get_signature_ranges(field)?.sign_buffer(self.pdf)
    }

    /// The `/Contents` of a field's signature value, padding included.
    pub fn get_signature_contents(&self, field: ObjectId) -> Result<&[u8]> {
        Ok(self
            .signature_value(field)?
            .get_deref(b"Contents", &self.doc)?
            .as_str()?)
    }

    /// The signature as uppercase hex, without the trailing `00` pairs used
    /// to pad the placeholder.
    pub fn get_signature_hex_string(&self, field: ObjectId) -> Result<String> {
        let mut hex = hex::encode_upper(self.get_signature_contents(field)?);
        while hex.ends_with("00") {
            hex.truncate(hex.len() - 2);
        }
        Ok(hex)
    }

    /// True when nothing follows the bytes covered by the signature.
    pub fn is_signature_for_entire_document(&self, field: ObjectId) -> Result<bool> {
        Ok(self.get_signature_ranges(field)?.after.end() == self.pdf.len())
    }

    pub fn get_signature_details(&self, field: ObjectId) -> Result<SignatureDetails> {
        let value = self.signature_value(field)?;
        let text = |key: &[u8]| {
            value
                .get_deref(key, &self.doc)
                .and_then(Object::as_str)
                .ok()
                .map(decode_text_string)
        };

        Ok(SignatureDetails {
            name: text(b"Name"),
            location: text(b"Location"),
            reason: text(b"Reason"),
            date: value
                .get_deref(b"M", &self.doc)
                .and_then(Object::as_str)
                .ok()
                .and_then(parse_date),
            contact_info: text(b"ContactInfo"),
        })
    }

    /// Serializes the incremental update and appends it to the original
    /// bytes, patching the `/ByteRange` of a signature placeholder if the
    /// update holds one.
    pub fn save(&self) -> Result<Vec<u8>> {
        let mut writer = IncrementalWriter::new(self.pdf);
        for &id in &self.changed {
            writer.write_indirect(id, self.doc.get_object(id)?);
        }
        let mut incremental = writer.finish(&self.doc.trailer, self.doc.max_id + 1)?;

        if let Some(ranges) = byte_range::update_byte_range(&mut incremental, self.pdf.len())? {
            debug!("signature placeholder ranges: {:?}", ranges.byte_range_array());
        }
        debug!(
            "saved {} objects in a {} byte incremental update",
            self.changed.len(),
            incremental.len()
        );

        let mut output = Vec::with_capacity(self.pdf.len() + incremental.len());
        output.extend_from_slice(self.pdf);
        output.extend_from_slice(&incremental);
        Ok(output)
    }

    fn signature_value(&self, field: ObjectId) -> Result<&Dictionary> {
        let field = self.get_dictionary(field)?;
        if !field.has(b"V") {
            return Err(Error::NoPlaceholder);
        }
        Ok(field.get_deref(b"V", &self.doc)?.as_dict()?)
    }

    fn is_signature(&self, dict: &Dictionary) -> bool {
        let name_is = |key: &[u8], expected: &[u8]| {
            dict.get_deref(key, &self.doc)
                .and_then(Object::as_name)
                .is_ok_and(|name| name == expected)
        };
        name_is(b"FT", b"Sig") && name_is(b"Type", b"Annot") && name_is(b"Subtype", b"Widget")
    }

    fn catalog_id(&self) -> Result<ObjectId> {
        Ok(self.doc.trailer.get(b"Root")?.as_reference()?)
    }

    fn acro_form_location(&self) -> Result<Option<Location>> {
        self.child(&Location::root(self.catalog_id()?), b"AcroForm")
    }

    fn acro_form(&mut self) -> Result<Location> {
        if let Some(acro_form) = self.acro_form_location()? {
            return Ok(acro_form);
        }

        let acro_form = self.register_object(dictionary! {
            "Fields" => Object::Array(Vec::new()),
            "SigFlags" => Object::Integer(3),
        });
        let catalog = self.catalog_id()?;
        self.get_dictionary_mut(catalog)?
            .set("AcroForm", Object::Reference(acro_form));
        self.changed.insert(catalog);
        trace!("created AcroForm {acro_form:?}");
        Ok(Location::root(acro_form))
    }

    fn page_annots(&mut self, page_index: usize) -> Result<Location> {
        let page = Location::root(self.get_page_id(page_index)?);
        self.child_or_insert(&page, b"Annots", || Object::Array(Vec::new()))
    }

    fn page_contents(&mut self, page_index: usize) -> Result<Location> {
        let page_id = self.get_page_id(page_index)?;
        let page = Location::root(page_id);

        let wrapped = match self.get_dictionary(page_id)?.get(b"Contents") {
            Ok(Object::Array(_)) => return Ok(page.child(b"Contents")),
            Ok(Object::Reference(id)) => {
                if let Ok(Object::Array(_)) = self.doc.get_object(*id) {
                    return Ok(Location::root(*id));
                }
                vec![Object::Reference(*id)]
            }
            Ok(other) => vec![other.clone()],
            Err(_) => Vec::new(),
        };

        self.get_dictionary_mut(page_id)?
            .set("Contents", Object::Array(wrapped));
        self.changed.insert(page_id);
        Ok(page.child(b"Contents"))
    }

    /// The page's own resources, copied from an ancestor when inherited.
    fn page_resources(&mut self, page: ObjectId) -> Result<Location> {
        let page_location = Location::root(page);
        if let Some(resources) = self.child(&page_location, b"Resources")? {
            return Ok(resources);
        }

        let inherited = match self.inherited_attribute(page, b"Resources")? {
            Some(resources) => as_dict(resources)?.clone(),
            None => Dictionary::new(),
        };
        self.child_or_insert(&page_location, b"Resources", || {
            Object::Dictionary(inherited)
        })
    }

    fn page_xobjects(&mut self, page_index: usize) -> Result<Location> {
        let resources = self.page_resources(self.get_page_id(page_index)?)?;
        self.child_or_insert(&resources, b"XObject", || {
            Object::Dictionary(Dictionary::new())
        })
    }

    /// Looks up a page attribute, following `/Parent` for inherited ones.
    fn inherited_attribute(&self, page: ObjectId, key: &[u8]) -> Result<Option<&Object>> {
        let mut node = self.get_dictionary(page)?;
        for _ in 0..MAX_DEPTH {
            if let Ok(value) = node.get(key) {
                return Ok(Some(self.doc.dereference(value)?.1));
            }
            match node.get(b"Parent") {
                Ok(Object::Reference(parent)) => node = self.get_dictionary(*parent)?,
                _ => return Ok(None),
            }
        }
        Err(lopdf::Error::ReferenceLimit.into())
    }

    fn object_at(&self, location: &Location) -> Result<&Object> {
        let mut object = self.doc.get_object(location.owner)?;
        for key in &location.path {
            object = as_dict(object)?.get(key)?;
        }
        Ok(object)
    }

    fn object_at_mut(&mut self, location: &Location) -> Result<&mut Object> {
        let mut object = self.doc.get_object_mut(location.owner)?;
        for key in &location.path {
            object = as_dict_mut(object)?.get_mut(key)?;
        }
        Ok(object)
    }

    /// Location of the value under `key`, following a reference to its
    /// target object.
    fn child(&self, location: &Location, key: &'static [u8]) -> Result<Option<Location>> {
        let mut child = match as_dict(self.object_at(location)?)?.get(key) {
            Ok(Object::Reference(id)) => Location::root(*id),
            Ok(_) => return Ok(Some(location.child(key))),
            Err(_) => return Ok(None),
        };
        for _ in 0..MAX_DEPTH {
            match self.doc.get_object(child.owner)? {
                Object::Reference(id) => child = Location::root(*id),
                _ => return Ok(Some(child)),
            }
        }
        Err(lopdf::Error::ReferenceLimit.into())
    }

    fn child_or_insert(
        &mut self,
        location: &Location,
        key: &'static [u8],
        default: impl FnOnce() -> Object,
    ) -> Result<Location> {
        if let Some(child) = self.child(location, key)? {
            return Ok(child);
        }
        as_dict_mut(self.object_at_mut(location)?)?.set(key, default());
        self.changed.insert(location.owner);
        Ok(location.child(key))
    }

    fn push_reference(&mut self, array: &Location, id: ObjectId) -> Result<()> {
        self.object_at_mut(array)?
            .as_array_mut()?
            .push(Object::Reference(id));
        self.changed.insert(array.owner);
        Ok(())
    }
}
