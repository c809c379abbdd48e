//! Turn one validated image file into a PDF image XObject payload.
//!
//! ## Direct embedding
//!
//! * **JPEG**: the file bytes become the stream as-is under `/DCTDecode`.
//!   Only the SOF header is parsed, to learn the component count. Adobe CMYK
//!   files store inverted ink values, so they get `/Decode [1 0 1 0 1 0 1 0]`.
//! * **PNG**: the concatenated `IDAT` payload already is a zlib stream of
//!   PNG-filtered scanlines, which PDF reads natively with `/FlateDecode` and
//!   a PNG predictor (`/Predictor 15`). This covers non-interlaced grey, RGB
//!   and palette images without transparency. The header is read with the
//!   `png` crate; only the `IDAT` slicing walks the chunks here.
//!
//! A JPEG's EXIF orientation becomes the page's `/Rotate`; the image bytes
//! are never rotated.
//!
//! ## Re-encode fallback
//!
//! Everything else (alpha, interlacing, 12-bit JPEG, BMP, GIF, TIFF) is
//! decoded once and the exact pixel values are zlib-compressed. Alpha goes
//! into a separate `/SMask` image, skipped when every pixel is opaque.

use crate::pipeline::validate::{ImageCandidate, SourceFormat};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder};
use std::io::{Cursor, Write};
use tracing::debug;

/// Colour space of an image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRgb,
    DeviceCmyk,
    /// Palette over DeviceRGB; `palette` is `3 * entries` bytes.
    Indexed { palette: Vec<u8> },
}

/// Stream filter of an image XObject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFilter {
    Dct,
    Flate,
}

/// `/DecodeParms` for PNG-predicted flate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngPredictor {
    pub colors: u8,
    pub bits_per_component: u8,
    pub columns: u32,
}

/// Everything needed to write one image XObject.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub bits_per_component: u8,
    pub filter: StreamFilter,
    pub predictor: Option<PngPredictor>,
    /// Adobe-style inverted CMYK.
    pub invert_cmyk: bool,
    pub data: Vec<u8>,
    pub smask: Option<Box<EmbeddedImage>>,
    /// The stream is the source file's own encoded bytes.
    pub passthrough: bool,
    /// Clockwise page rotation in degrees (0, 90, 180 or 270).
    pub rotation: u16,
}

/// Read `candidate` from disk and prepare it for embedding.
///
/// The error string is the detail of an assembly error for this file.
pub fn prepare(candidate: &ImageCandidate) -> Result<EmbeddedImage, String> {
    let format = candidate
        .format
        .ok_or_else(|| "image was not validated".to_string())?;
    let bytes = std::fs::read(&candidate.path).map_err(|e| format!("cannot read file: {e}"))?;
    let rotation = match format {
        SourceFormat::Jpeg => exif_rotation(&bytes),
        _ => 0,
    };

    let direct = match format {
        SourceFormat::Jpeg => jpeg_direct(bytes)?,
        SourceFormat::Png => png_direct(&bytes)?.ok_or(bytes),
        _ => Err(bytes),
    };

    let mut image = match direct {
        Ok(image) => image,
        Err(bytes) => reencode(&bytes, format)?,
    };
    image.rotation = rotation;

    debug!(
        "Prepared '{}': {}x{} {:?} {} bytes{}",
        candidate.path.display(),
        image.width,
        image.height,
        image.filter,
        image.data.len(),
        if image.passthrough { " (original bytes)" } else { " (re-encoded)" }
    );
    Ok(image)
}

// ── JPEG ────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
struct JpegHeader {
    marker: u8,
    precision: u8,
    width: u16,
    height: u16,
    components: u8,
    adobe: bool,
}

/// Walk the marker segments up to the first SOF.
fn parse_jpeg_header(data: &[u8]) -> Result<JpegHeader, String> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err("missing JPEG SOI marker".into());
    }
    let mut adobe = false;
    let mut i = 2;
    loop {
        if i + 1 >= data.len() {
            return Err("JPEG ends before the frame header".into());
        }
        if data[i] != 0xFF {
            return Err(format!("invalid JPEG marker at byte {i}"));
        }
        let marker = data[i + 1];
        match marker {
            0xFF => {
                i += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                i += 2;
                continue;
            }
            0xD9 | 0xDA => return Err("JPEG has no frame header before scan data".into()),
            _ => {}
        }

        if i + 4 > data.len() {
            return Err("truncated JPEG segment".into());
        }
        let len = usize::from(u16::from_be_bytes([data[i + 2], data[i + 3]]));
        if len < 2 || i + 2 + len > data.len() {
            return Err("truncated JPEG segment".into());
        }
        let seg = &data[i + 4..i + 2 + len];

        match marker {
            0xEE if seg.starts_with(b"Adobe") => adobe = true,
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                if seg.len() < 6 {
                    return Err("truncated JPEG frame header".into());
                }
                return Ok(JpegHeader {
                    marker,
                    precision: seg[0],
                    height: u16::from_be_bytes([seg[1], seg[2]]),
                    width: u16::from_be_bytes([seg[3], seg[4]]),
                    components: seg[5],
                    adobe,
                });
            }
            _ => {}
        }
        i += 2 + len;
    }
}

/// Embed a JPEG untouched when PDF's DCT filter can read it.
///
/// `Err(detail)` for a damaged header; `Ok(Err(bytes))` hands the bytes back
/// for re-encoding (12-bit, lossless or arithmetic-coded JPEG).
fn jpeg_direct(bytes: Vec<u8>) -> Result<Result<EmbeddedImage, Vec<u8>>, String> {
    let header = parse_jpeg_header(&bytes)?;

    // Baseline, extended and progressive Huffman only.
    if !matches!(header.marker, 0xC0..=0xC2) || header.precision != 8 || header.height == 0 {
        return Ok(Err(bytes));
    }
    let color_space = match header.components {
        1 => ColorSpace::DeviceGray,
        3 => ColorSpace::DeviceRgb,
        4 => ColorSpace::DeviceCmyk,
        _ => return Ok(Err(bytes)),
    };
    let invert_cmyk = header.components == 4 && header.adobe;

    Ok(Ok(EmbeddedImage {
        width: u32::from(header.width),
        height: u32::from(header.height),
        color_space,
        bits_per_component: 8,
        filter: StreamFilter::Dct,
        predictor: None,
        invert_cmyk,
        data: bytes,
        smask: None,
        passthrough: true,
        rotation: 0,
    }))
}

/// Clockwise page rotation for a JPEG's EXIF orientation.
///
/// Mirrored orientations have no `/Rotate` equivalent; those pages keep
/// the stored orientation.
fn exif_rotation(bytes: &[u8]) -> u16 {
    match JpegDecoder::new(Cursor::new(bytes)).and_then(|mut d| d.orientation()) {
        Ok(Orientation::NoTransforms) => 0,
        Ok(Orientation::Rotate90) => 90,
        Ok(Orientation::Rotate180) => 180,
        Ok(Orientation::Rotate270) => 270,
        Ok(mirrored) => {
            debug!("Ignoring mirrored EXIF orientation {mirrored:?}");
            0
        }
        Err(e) => {
            debug!("No EXIF orientation: {e}");
            0
        }
    }
}

// ── PNG ─────────────────────────────────────────────────────────────────

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

/// The concatenated `IDAT` payload, sliced out of the chunk stream.
fn idat_payload(data: &[u8]) -> Result<Vec<u8>, String> {
    if data.len() < 8 || &data[..8] != PNG_SIGNATURE {
        return Err("missing PNG signature".into());
    }
    let mut idat = Vec::new();
    let mut chunks = 0;
    let mut i = 8;
    loop {
        if i + 8 > data.len() {
            return Err("truncated PNG: no IEND chunk".into());
        }
        let len = u32::from_be_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]) as usize;
        let kind = &data[i + 4..i + 8];
        let body_start = i + 8;
        let body_end = body_start
            .checked_add(len)
            .filter(|end| end + 4 <= data.len())
            .ok_or_else(|| format!("truncated PNG chunk {}", String::from_utf8_lossy(kind)))?;

        match kind {
            b"IDAT" => {
                idat.extend_from_slice(&data[body_start..body_end]);
                chunks += 1;
            }
            b"IEND" => break,
            _ => {}
        }
        i = body_end + 4;
    }

    if chunks == 0 {
        return Err("PNG has no IDAT chunk".into());
    }
    Ok(idat)
}

/// Embed PNG image data untouched when a PDF flate stream can express it.
///
/// `Ok(None)` means the file is fine but needs re-encoding.
fn png_direct(bytes: &[u8]) -> Result<Option<EmbeddedImage>, String> {
    let reader = png::Decoder::new(Cursor::new(bytes))
        .read_info()
        .map_err(|e| format!("cannot read PNG header: {e}"))?;
    let info = reader.info();
    if info.interlaced || info.trns.is_some() {
        return Ok(None);
    }

    let bit_depth = info.bit_depth as u8;
    let (color_space, colors) = match info.color_type {
        png::ColorType::Grayscale => (ColorSpace::DeviceGray, 1),
        png::ColorType::Rgb => (ColorSpace::DeviceRgb, 3),
        png::ColorType::Indexed => {
            let palette = info
                .palette
                .as_deref()
                .filter(|p| !p.is_empty() && p.len() % 3 == 0 && p.len() <= 256 * 3)
                .ok_or_else(|| "palette PNG without a valid PLTE chunk".to_string())?;
            (
                ColorSpace::Indexed {
                    palette: palette.to_vec(),
                },
                1,
            )
        }
        // Grey+alpha and RGBA need their alpha split into an SMask.
        png::ColorType::GrayscaleAlpha | png::ColorType::Rgba => return Ok(None),
    };
    let (width, height) = (info.width, info.height);

    Ok(Some(EmbeddedImage {
        width,
        height,
        color_space,
        bits_per_component: bit_depth,
        filter: StreamFilter::Flate,
        predictor: Some(PngPredictor {
            colors,
            bits_per_component: bit_depth,
            columns: width,
        }),
        invert_cmyk: false,
        data: idat_payload(bytes)?,
        smask: None,
        passthrough: true,
        rotation: 0,
    }))
}

// ── Re-encode ───────────────────────────────────────────────────────────

fn reencode(bytes: &[u8], format: SourceFormat) -> Result<EmbeddedImage, String> {
    let img = image::load_from_memory_with_format(bytes, format.image_format())
        .map_err(|e| format!("cannot decode {format}: {e}"))?;
    let (width, height) = (img.width(), img.height());
    let color = img.color();

    let sixteen = matches!(
        color,
        ColorType::L16
            | ColorType::La16
            | ColorType::Rgb16
            | ColorType::Rgba16
            | ColorType::Rgb32F
            | ColorType::Rgba32F
    );
    let gray = matches!(
        color,
        ColorType::L8 | ColorType::La8 | ColorType::L16 | ColorType::La16
    );

    let (color_space, pixels) = match (gray, sixteen) {
        (true, false) => (ColorSpace::DeviceGray, img.to_luma8().into_raw()),
        (true, true) => (ColorSpace::DeviceGray, be_bytes(img.to_luma16().into_raw())),
        (false, false) => (ColorSpace::DeviceRgb, img.to_rgb8().into_raw()),
        (false, true) => (ColorSpace::DeviceRgb, be_bytes(img.to_rgb16().into_raw())),
    };
    let bits_per_component = if sixteen { 16 } else { 8 };

    let smask = if color.has_alpha() {
        alpha_channel(&img, sixteen)
            .map(|alpha| -> Result<Box<EmbeddedImage>, String> {
                Ok(Box::new(EmbeddedImage {
                    width,
                    height,
                    color_space: ColorSpace::DeviceGray,
                    bits_per_component,
                    filter: StreamFilter::Flate,
                    predictor: None,
                    invert_cmyk: false,
                    data: deflate(&alpha)?,
                    smask: None,
                    passthrough: false,
                    rotation: 0,
                }))
            })
            .transpose()?
    } else {
        None
    };

    Ok(EmbeddedImage {
        width,
        height,
        color_space,
        bits_per_component,
        filter: StreamFilter::Flate,
        predictor: None,
        invert_cmyk: false,
        data: deflate(&pixels)?,
        smask,
        passthrough: false,
        rotation: 0,
    })
}

/// Alpha samples, or `None` when every pixel is fully opaque.
fn alpha_channel(img: &DynamicImage, sixteen: bool) -> Option<Vec<u8>> {
    if sixteen {
        let alpha: Vec<u16> = img.to_rgba16().pixels().map(|p| p.0[3]).collect();
        if alpha.iter().all(|&a| a == u16::MAX) {
            return None;
        }
        Some(be_bytes(alpha))
    } else {
        let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
        if alpha.iter().all(|&a| a == u8::MAX) {
            return None;
        }
        Some(alpha)
    }
}

fn be_bytes(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_be_bytes).collect()
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut enc = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    enc.write_all(data)
        .and_then(|_| enc.finish())
        .map_err(|e| format!("zlib compression failed: {e}"))
}
