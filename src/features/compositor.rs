//! Stamps a raster overlay (QR code or signature bitmap) onto one page of an
//! existing PDF.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageFormat};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::error::OverlayError;
use crate::features::geometry::{Rect, Size};
use crate::features::store::BlobStore;

/// Page-tree walks stop here; protects against `Parent` cycles.
const MAX_TREE_DEPTH: usize = 64;
const OVERLAY_NAME: &str = "SignOverlay";
const FALLBACK_PAGE: (f64, f64) = (595.0, 842.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageKind::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    pub fn from_extension(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            _ => None,
        }
    }

    fn format(self) -> ImageFormat {
        match self {
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Jpeg => ImageFormat::Jpeg,
        }
    }

    fn other(self) -> Self {
        match self {
            ImageKind::Png => ImageKind::Jpeg,
            ImageKind::Jpeg => ImageKind::Png,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Payload carried in the reference itself; never touches the network.
    Inline {
        hint: Option<ImageKind>,
        bytes: Vec<u8>,
    },
    Remote {
        url: String,
        hint: Option<ImageKind>,
    },
}

impl ImageSource {
    /// Accepts `data:` URLs, `http(s)://` and `file://` URLs, absolute paths
    /// and bare base64 (what a signature pad hands over).
    pub fn parse(reference: &str) -> Result<Self, OverlayError> {
        let reference = reference.trim();
        if let Some(rest) = reference.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| OverlayError::Decode("data_url_missing_payload".into()))?;
            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default();
            if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
                return Err(OverlayError::Decode("data_url_not_base64".into()));
            }
            return Ok(ImageSource::Inline {
                hint: ImageKind::from_mime(mime),
                bytes: decode_base64(payload)?,
            });
        }
        if reference.starts_with("http://")
            || reference.starts_with("https://")
            || reference.starts_with("file://")
            || reference.starts_with('/')
        {
            return Ok(ImageSource::Remote {
                url: reference.to_string(),
                hint: ImageKind::from_extension(reference),
            });
        }
        Ok(ImageSource::Inline {
            hint: None,
            bytes: decode_base64(reference)?,
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ImageSource::Remote { .. })
    }

    pub fn resolve(&self, blobs: &dyn BlobStore) -> Result<OverlayImage, OverlayError> {
        match self {
            ImageSource::Inline { hint, bytes } => Ok(OverlayImage {
                bytes: bytes.clone(),
                hint: *hint,
            }),
            ImageSource::Remote { url, hint } => Ok(OverlayImage {
                bytes: blobs.get(url)?,
                hint: *hint,
            }),
        }
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, OverlayError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    B64.decode(compact.as_bytes())
        .map_err(|e| OverlayError::Decode(format!("base64:{e}")))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayImage {
    pub bytes: Vec<u8>,
    pub hint: Option<ImageKind>,
}

pub struct DecodedOverlay {
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
    rgb: Vec<u8>,
    /// Only present when some pixel is not fully opaque.
    alpha: Option<Vec<u8>>,
}

impl OverlayImage {
    /// Hinted format first, then the other one. Nothing beyond PNG and JPEG.
    pub fn decode(&self) -> Result<DecodedOverlay, OverlayError> {
        if self.bytes.is_empty() {
            return Err(OverlayError::Decode("empty_image".into()));
        }
        let first = self.hint.unwrap_or(ImageKind::Png);
        let mut failures = Vec::with_capacity(2);
        for kind in [first, first.other()] {
            match image::load_from_memory_with_format(&self.bytes, kind.format()) {
                Ok(img) => {
                    if kind != first {
                        log::warn!("overlay image is not {first:?}, decoded as {kind:?}");
                    }
                    return DecodedOverlay::from_image(img, kind);
                }
                Err(e) => failures.push(format!("{kind:?}:{e}")),
            }
        }
        Err(OverlayError::Decode(failures.join("; ")))
    }
}

impl DecodedOverlay {
    fn from_image(img: DynamicImage, kind: ImageKind) -> Result<Self, OverlayError> {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(OverlayError::Decode("empty_dimensions".into()));
        }
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }
        let translucent = alpha.iter().any(|a| *a != u8::MAX);
        Ok(Self {
            width,
            height,
            kind,
            rgb,
            alpha: translucent.then_some(alpha),
        })
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub width: f64,
    pub height: f64,
    pub page_count: usize,
}

impl PageInfo {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

fn load_document(pdf_bytes: &[u8]) -> Result<Document, OverlayError> {
    Document::load_mem(pdf_bytes).map_err(|e| OverlayError::Load(e.to_string()))
}

fn page_id_at(doc: &Document, page_index: usize) -> Result<(ObjectId, usize), OverlayError> {
    let pages = doc.get_pages();
    let count = pages.len();
    if count == 0 {
        return Err(OverlayError::Load("no_pages".into()));
    }
    pages
        .values()
        .nth(page_index)
        .map(|id| (*id, count))
        .ok_or_else(|| OverlayError::Load(format!("page_out_of_range:{page_index}/{count}")))
}

pub fn page_dimensions(pdf_bytes: &[u8], page_index: usize) -> Result<PageInfo, OverlayError> {
    let doc = load_document(pdf_bytes)?;
    let (page_id, page_count) = page_id_at(&doc, page_index)?;
    let (_, _, width, height) = media_box(&doc, page_id)?;
    Ok(PageInfo {
        width,
        height,
        page_count,
    })
}

/// `(llx, lly, width, height)` of the page, following `Parent` inheritance.
fn media_box(doc: &Document, page_id: ObjectId) -> Result<(f64, f64, f64, f64), OverlayError> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = current else { break };
        let dict = doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|_| OverlayError::Load("page_missing_dict".into()))?;
        if let Some(found) = extract_media_box(doc, dict) {
            return Ok(found);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    log::warn!("page {page_id:?} has no MediaBox, assuming A4");
    Ok((0.0, 0.0, FALLBACK_PAGE.0, FALLBACK_PAGE.1))
}

fn extract_media_box(doc: &Document, dict: &Dictionary) -> Option<(f64, f64, f64, f64)> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let arr = resolved.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let llx = obj_to_f64(&arr[0])?;
    let lly = obj_to_f64(&arr[1])?;
    let urx = obj_to_f64(&arr[2])?;
    let ury = obj_to_f64(&arr[3])?;
    Some((llx.min(urx), lly.min(ury), (urx - llx).abs(), (ury - lly).abs()))
}

fn obj_to_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(f) => Some((*f).into()),
        _ => None,
    }
}

/// Resolves `source` (fetching remote references through `blobs`) and
/// stamps it. `rect` is in PDF points, origin bottom-left.
pub fn apply(
    pdf_bytes: &[u8],
    source: &ImageSource,
    rect: Rect,
    page_index: usize,
    blobs: &dyn BlobStore,
) -> Result<Vec<u8>, OverlayError> {
    let image = source.resolve(blobs)?;
    apply_image(pdf_bytes, &image, rect, page_index)
}

pub fn apply_image(
    pdf_bytes: &[u8],
    image: &OverlayImage,
    rect: Rect,
    page_index: usize,
) -> Result<Vec<u8>, OverlayError> {
    let mut doc = load_document(pdf_bytes)?;
    let (page_id, _) = page_id_at(&doc, page_index)?;
    let decoded = image.decode()?;

    if ![rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite())
        || rect.width <= 0.0
        || rect.height <= 0.0
    {
        return Err(OverlayError::Embed(format!("invalid_rect:{rect:?}")));
    }

    let (llx, lly, _, _) = media_box(&doc, page_id)?;
    let image_id = add_image_xobject(&mut doc, &decoded)?;
    let name = register_xobject(&mut doc, page_id, image_id)?;
    let draw = format!(
        "Q\nq {} 0 0 {} {} {} cm /{} Do Q\n",
        fmt_num(rect.width),
        fmt_num(rect.height),
        fmt_num(rect.x + llx),
        fmt_num(rect.y + lly),
        name
    );
    append_wrapped_content(&mut doc, page_id, draw)?;
    log::debug!(
        "stamped {}x{} {:?} overlay as /{} on page {}",
        decoded.width,
        decoded.height,
        decoded.kind,
        name,
        page_index
    );

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| OverlayError::Embed(format!("pdf_save_failed:{e}")))?;
    Ok(out)
}

fn fmt_num(v: f64) -> String {
    // Anything that rounds to zero prints as "0", never "-0".
    let v = if v.abs() < 0.0005 { 0.0 } else { v };
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, OverlayError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| OverlayError::Embed(format!("deflate_failed:{e}")))?;
    encoder
        .finish()
        .map_err(|e| OverlayError::Embed(format!("deflate_failed:{e}")))
}

fn add_image_xobject(doc: &mut Document, img: &DecodedOverlay) -> Result<ObjectId, OverlayError> {
    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(alpha) = &img.alpha {
        let smask_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img.width as i64,
                "Height" => img.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(alpha)?,
        ));
        image_dict.set("SMask", smask_id);
    }
    Ok(doc.add_object(Stream::new(image_dict, deflate(&img.rgb)?)))
}

/// Resources the page actually renders with, inherited ones included.
fn effective_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, OverlayError> {
    let mut current = Some(page_id);
    for _ in 0..MAX_TREE_DEPTH {
        let Some(id) = current else { break };
        let dict = doc
            .get_object(id)
            .and_then(Object::as_dict)
            .map_err(|_| OverlayError::Embed("page_missing_dict".into()))?;
        match dict.get(b"Resources") {
            Ok(Object::Dictionary(res)) => return Ok(res.clone()),
            Ok(Object::Reference(res_id)) => {
                return doc
                    .get_object(*res_id)
                    .and_then(Object::as_dict)
                    .cloned()
                    .map_err(|_| OverlayError::Embed("resources_missing_dict".into()))
            }
            Ok(_) => return Err(OverlayError::Embed("resources_invalid".into())),
            Err(_) => {}
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(Dictionary::new())
}

/// Gives the page its own resource dictionary with the image under a fresh
/// name, leaving resources shared with other pages untouched.
fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    image_id: ObjectId,
) -> Result<String, OverlayError> {
    let mut resources = effective_resources(doc, page_id)?;
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(d)) => d.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .map_err(|_| OverlayError::Embed("xobject_missing_dict".into()))?,
        Ok(_) => return Err(OverlayError::Embed("xobject_invalid".into())),
        Err(_) => Dictionary::new(),
    };

    let mut name = OVERLAY_NAME.to_string();
    let mut n = 1;
    while xobjects.has(name.as_bytes()) {
        name = format!("{OVERLAY_NAME}{n}");
        n += 1;
    }
    xobjects.set(name.clone(), image_id);
    resources.set("XObject", xobjects);

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| OverlayError::Embed("page_missing_dict".into()))?;
    page_dict.set("Resources", resources);
    Ok(name)
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, OverlayError> {
    let page_dict = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map_err(|_| OverlayError::Embed("page_missing_dict".into()))?;
    match page_dict.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => Ok(items.clone()),
            Ok(Object::Stream(_)) => Ok(vec![Object::Reference(*id)]),
            _ => Err(OverlayError::Embed("contents_invalid".into())),
        },
        Ok(Object::Stream(_)) => Err(OverlayError::Embed("contents_inline_stream".into())),
        Ok(_) => Err(OverlayError::Embed("contents_invalid".into())),
    }
}

/// Wraps the existing page content in `q`/`Q` so whatever graphics state it
/// leaves behind cannot distort the overlay, then appends `draw` (which
/// starts with the closing `Q`).
fn append_wrapped_content(
    doc: &mut Document,
    page_id: ObjectId,
    draw: String,
) -> Result<(), OverlayError> {
    let existing = existing_contents(doc, page_id)?;
    let mut contents = Vec::with_capacity(existing.len() + 2);
    if existing.is_empty() {
        let body = draw.trim_start_matches("Q\n").to_string();
        contents.push(Object::Reference(
            doc.add_object(Stream::new(dictionary! {}, body.into_bytes())),
        ));
    } else {
        let open = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let close = doc.add_object(Stream::new(dictionary! {}, draw.into_bytes()));
        contents.push(Object::Reference(open));
        contents.extend(existing);
        contents.push(Object::Reference(close));
    }

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|_| OverlayError::Embed("page_missing_dict".into()))?;
    page_dict.set("Contents", Object::Array(contents));
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_fixtures::{jpeg, pdf_with_pages, png};
    use super::*;
    use crate::features::store::FsBlobStore;
    use std::time::Duration;
    use tempfile::tempdir;

    fn count_images(doc: &Document) -> usize {
        doc.objects
            .values()
            .filter(|obj| match obj {
                Object::Stream(s) => {
                    matches!(s.dict.get(b"Subtype").and_then(Object::as_name), Ok(n) if n == b"Image")
                }
                _ => false,
            })
            .count()
    }

    fn page_content(bytes: &[u8], index: usize) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let (page_id, _) = page_id_at(&doc, index).unwrap();
        String::from_utf8(doc.get_page_content(page_id).unwrap()).unwrap()
    }

    fn png_image() -> OverlayImage {
        OverlayImage {
            bytes: png(100, 100, 255),
            hint: Some(ImageKind::Png),
        }
    }

    #[test]
    fn page_dimensions_reads_inherited_media_box() {
        let pdf = pdf_with_pages(2);
        let info = page_dimensions(&pdf, 1).unwrap();
        assert_eq!(info, PageInfo { width: 595.0, height: 842.0, page_count: 2 });
    }

    #[test]
    fn page_dimensions_rejects_garbage_and_bad_index() {
        assert!(matches!(page_dimensions(b"not a pdf", 0), Err(OverlayError::Load(_))));
        let pdf = pdf_with_pages(1);
        assert!(matches!(page_dimensions(&pdf, 1), Err(OverlayError::Load(_))));
    }

    #[test]
    fn opaque_png_adds_exactly_one_image() {
        let pdf = pdf_with_pages(1);
        let before = count_images(&Document::load_mem(&pdf).unwrap());
        let out = apply_image(&pdf, &png_image(), Rect::new(50.0, 50.0, 100.0, 100.0), 0).unwrap();

        assert!(out.starts_with(b"%PDF-"));
        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(count_images(&doc), before + 1);

        let content = page_content(&out, 0);
        assert!(content.starts_with("q\n"), "{content}");
        assert!(content.contains("q 100 0 0 100 50 50 cm /SignOverlay Do Q"), "{content}");
        assert!(content.contains("(Page 1) Tj"));
    }

    #[test]
    fn inherited_resources_survive_on_the_page() {
        let pdf = pdf_with_pages(1);
        let out = apply_image(&pdf, &png_image(), Rect::new(0.0, 0.0, 10.0, 10.0), 0).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        let (page_id, _) = page_id_at(&doc, 0).unwrap();
        let resources = effective_resources(&doc, page_id).unwrap();
        assert!(resources.get(b"Font").is_ok());
        let xobjects = resources.get(b"XObject").and_then(Object::as_dict).unwrap();
        assert!(xobjects.has(b"SignOverlay"));
    }

    #[test]
    fn translucent_png_gets_soft_mask() {
        let pdf = pdf_with_pages(1);
        let image = OverlayImage { bytes: png(8, 8, 128), hint: None };
        let out = apply_image(&pdf, &image, Rect::new(10.0, 10.0, 8.0, 8.0), 0).unwrap();
        let doc = Document::load_mem(&out).unwrap();
        assert_eq!(count_images(&doc), 2);
    }

    #[test]
    fn second_overlay_gets_fresh_name_and_other_pages_untouched() {
        let pdf = pdf_with_pages(2);
        let once = apply_image(&pdf, &png_image(), Rect::new(1.0, 1.0, 5.0, 5.0), 1).unwrap();
        let twice = apply_image(&once, &png_image(), Rect::new(20.0, 20.0, 5.0, 5.0), 1).unwrap();
        let content = page_content(&twice, 1);
        assert!(content.contains("/SignOverlay Do"));
        assert!(content.contains("/SignOverlay1 Do"));
        assert_eq!(page_content(&twice, 0), page_content(&pdf, 0));
        assert_eq!(Document::load_mem(&twice).unwrap().get_pages().len(), 2);
    }

    #[test]
    fn jpeg_labelled_as_png_falls_back() {
        let pdf = pdf_with_pages(1);
        let image = OverlayImage { bytes: jpeg(16, 16), hint: Some(ImageKind::Png) };
        let decoded = image.decode().unwrap();
        assert_eq!(decoded.kind, ImageKind::Jpeg);
        assert!(!decoded.has_alpha());
        assert!(apply_image(&pdf, &image, Rect::new(0.0, 0.0, 16.0, 16.0), 0).is_ok());
    }

    #[test]
    fn neither_png_nor_jpeg_is_decode_error() {
        let pdf = pdf_with_pages(1);
        let image = OverlayImage { bytes: b"GIF89a not really".to_vec(), hint: None };
        let err = apply_image(&pdf, &image, Rect::new(0.0, 0.0, 16.0, 16.0), 0).unwrap_err();
        assert!(matches!(err, OverlayError::Decode(_)));
    }

    #[test]
    fn bad_pdf_and_page_index_are_load_errors() {
        let rect = Rect::new(0.0, 0.0, 16.0, 16.0);
        assert!(matches!(
            apply_image(b"%PDF-1.7 truncated", &png_image(), rect, 0),
            Err(OverlayError::Load(_))
        ));
        assert!(matches!(
            apply_image(&pdf_with_pages(1), &png_image(), rect, 3),
            Err(OverlayError::Load(_))
        ));
    }

    #[test]
    fn degenerate_rect_is_embed_error() {
        let err = apply_image(&pdf_with_pages(1), &png_image(), Rect::new(0.0, 0.0, 0.0, 5.0), 0)
            .unwrap_err();
        assert!(matches!(err, OverlayError::Embed(_)));
    }

    #[test]
    fn repeated_calls_place_identically_and_leave_input_alone() {
        let pdf = pdf_with_pages(1);
        let snapshot = pdf.clone();
        let rect = Rect::new(50.5, 60.25, 100.0, 40.0);
        let a = apply_image(&pdf, &png_image(), rect, 0).unwrap();
        let b = apply_image(&pdf, &png_image(), rect, 0).unwrap();
        assert_eq!(pdf, snapshot);
        assert_eq!(page_content(&a, 0), page_content(&b, 0));
        assert!(page_content(&a, 0).contains("q 100 0 0 40 50.5 60.25 cm"));
    }

    #[test]
    fn data_url_and_bare_base64_parse_inline() {
        let bytes = png(2, 2, 255);
        let encoded = B64.encode(&bytes);
        match ImageSource::parse(&format!("data:image/png;base64,{encoded}")).unwrap() {
            ImageSource::Inline { hint, bytes: decoded } => {
                assert_eq!(hint, Some(ImageKind::Png));
                assert_eq!(decoded, bytes);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ImageSource::parse(&encoded).unwrap(),
            ImageSource::Inline { hint: None, .. }
        ));
        assert!(matches!(
            ImageSource::parse("data:image/png,rawtext"),
            Err(OverlayError::Decode(_))
        ));
    }

    #[test]
    fn remote_reference_keeps_extension_hint() {
        let source = ImageSource::parse("https://cdn.example/sig.JPG?v=2").unwrap();
        assert_eq!(
            source,
            ImageSource::Remote {
                url: "https://cdn.example/sig.JPG?v=2".into(),
                hint: Some(ImageKind::Jpeg)
            }
        );
        assert!(source.is_remote());
    }

    #[test]
    fn apply_fetches_file_references_through_blob_store() {
        let dir = tempdir().unwrap();
        let blobs = FsBlobStore::open(dir.path().to_path_buf(), Duration::from_secs(1)).unwrap();
        let url = blobs.put(&png(4, 4, 255), "image/png").unwrap();
        let source = ImageSource::parse(&url).unwrap();
        let out = apply(&pdf_with_pages(1), &source, Rect::new(5.0, 5.0, 4.0, 4.0), 0, &blobs)
            .unwrap();
        assert!(page_content(&out, 0).contains("/SignOverlay Do"));

        let missing = ImageSource::parse(&format!("file://{}/gone.png", dir.path().display()))
            .unwrap();
        assert!(matches!(
            apply(&pdf_with_pages(1), &missing, Rect::new(5.0, 5.0, 4.0, 4.0), 0, &blobs),
            Err(OverlayError::Fetch(_))
        ));
    }

    #[test]
    fn numbers_are_compact() {
        assert_eq!(fmt_num(100.0), "100");
        assert_eq!(fmt_num(50.5), "50.5");
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(-0.0001), "0");
        assert_eq!(fmt_num(-0.0004), "0");
        assert_eq!(fmt_num(-12.25), "-12.25");
    }
}
