//! Raster images as image XObjects.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::ImageFormat;
use lopdf::{dictionary, Object, Stream};

pub(crate) struct ImageXObject {
    pub(crate) image: Stream,
    pub(crate) soft_mask: Option<Stream>,
}

/// Builds the XObject of a JPEG or PNG image, in that order of preference.
pub(crate) fn image_xobject(bytes: &[u8]) -> Option<ImageXObject> {
    jpeg_xobject(bytes)
        .map(|image| ImageXObject {
            image,
            soft_mask: None,
        })
        .or_else(|| png_xobject(bytes))
}

/// What the frame header of a JPEG says about its samples.
#[derive(Debug, PartialEq, Eq)]
struct JpegHeader {
    width: u16,
    height: u16,
    components: u8,
    /// An Adobe APP14 segment precedes the frame, so CMYK samples are stored
    /// inverted.
    adobe: bool,
}

/// Walks the marker segments up to the first start of frame.
fn jpeg_header(bytes: &[u8]) -> Option<JpegHeader> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }

    let mut adobe = false;
    let mut pos = 2;
    loop {
        // Fill bytes may precede a marker.
        while bytes.get(pos) == Some(&0xFF) && bytes.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if *bytes.get(pos)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        let length = u16::from_be_bytes([*bytes.get(pos + 2)?, *bytes.get(pos + 3)?]) as usize;
        let segment = bytes.get(pos + 4..pos + 2 + length)?;

        match marker {
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                let [precision, h1, h0, w1, w0, components, ..] = *segment else {
                    return None;
                };
                if precision != 8 {
                    return None;
                }
                return Some(JpegHeader {
                    width: u16::from_be_bytes([w1, w0]),
                    height: u16::from_be_bytes([h1, h0]),
                    components,
                    adobe,
                });
            }
            0xEE => adobe |= segment.starts_with(b"Adobe"),
            // Start of scan or end of image before any frame.
            0xDA | 0xD9 => return None,
            _ => {}
        }
        pos += 2 + length;
    }
}

/// JPEG data is embedded as is.
fn jpeg_xobject(bytes: &[u8]) -> Option<Stream> {
    let header = jpeg_header(bytes)?;
    if header.width == 0 || header.height == 0 {
        return None;
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(header.width.into()),
        "Height" => Object::Integer(header.height.into()),
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => "DCTDecode",
    };
    match header.components {
        1 => dict.set("ColorSpace", "DeviceGray"),
        3 => dict.set("ColorSpace", "DeviceRGB"),
        4 => {
            dict.set("ColorSpace", "DeviceCMYK");
            if header.adobe {
                let decode = [1, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer);
                dict.set("Decode", Object::Array(decode.to_vec()));
            }
        }
        _ => return None,
    }
    Some(Stream::new(dict, bytes.to_vec()))
}

fn png_xobject(bytes: &[u8]) -> Option<ImageXObject> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png).ok()?;
    let (width, height) = (decoded.width(), decoded.height());

    let soft_mask = if decoded.color().has_alpha() {
        let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p[3]).collect();
        Some(flate_image(width, height, "DeviceGray", &alpha)?)
    } else {
        None
    };

    let image = flate_image(width, height, "DeviceRGB", decoded.to_rgb8().as_raw())?;
    Some(ImageXObject { image, soft_mask })
}

fn flate_image(width: u32, height: u32, color_space: &str, samples: &[u8]) -> Option<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(samples).ok()?;
    let content = encoder.finish().ok()?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width.into()),
        "Height" => Object::Integer(height.into()),
        "ColorSpace" => color_space,
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => "FlateDecode",
    };
    Some(Stream::new(dict, content))
}
