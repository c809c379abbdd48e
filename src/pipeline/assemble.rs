//! Streaming PDF assembly.
//!
//! ## Why a streaming writer?
//!
//! Image sets can be hundreds of multi-megabyte photos. Building an in-memory
//! document model would hold every image at once. Instead each image is read,
//! written as a group of objects (image, optional soft mask, content stream,
//! page) and dropped before the next one is touched. Only the byte offsets of
//! written objects are kept; the page tree, catalog and cross-reference table
//! are emitted at the end.
//!
//! ## Why a temp file?
//!
//! Output goes to a [`tempfile::NamedTempFile`] in the destination directory
//! and is renamed over the final path only after the trailer is written. Any
//! error or cancellation drops the temp file, which deletes it, so the final
//! path never holds a half-written PDF.

use crate::error::Img2PdfError;
use crate::pipeline::embed::{self, ColorSpace, EmbeddedImage, StreamFilter};
use crate::pipeline::validate::ImageCandidate;
use std::fmt::Write as _;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

const CATALOG_ID: u32 = 1;
const PAGES_ID: u32 = 2;

/// Document-level metadata written to the `/Info` dictionary.
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: Option<String>,
}

/// What [`assemble`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub pages: usize,
    pub embedded_direct: usize,
    pub reencoded: usize,
    pub bytes: u64,
}

/// Incremental PDF 1.5 object writer.
pub struct PdfWriter<W: Write> {
    out: W,
    position: u64,
    /// Byte offset per object; index is object number - 1.
    offsets: Vec<Option<u64>>,
    page_ids: Vec<u32>,
}

impl<W: Write> PdfWriter<W> {
    /// Write the header and reserve the catalog and page-tree objects.
    pub fn begin(out: W) -> io::Result<Self> {
        let mut w = Self {
            out,
            position: 0,
            offsets: vec![None, None],
            page_ids: Vec::new(),
        };
        // Binary comment marks the file as 8-bit for transfer tools.
        w.write_raw(b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n")?;
        Ok(w)
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Push buffered bytes down to the sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn alloc(&mut self) -> u32 {
        self.offsets.push(None);
        self.offsets.len() as u32
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn write_object(&mut self, id: u32, body: &str) -> io::Result<()> {
        self.offsets[id as usize - 1] = Some(self.position);
        self.write_raw(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes())
    }

    fn write_stream(&mut self, id: u32, dict: &str, data: &[u8]) -> io::Result<()> {
        self.offsets[id as usize - 1] = Some(self.position);
        self.write_raw(format!("{id} 0 obj\n<<{dict} /Length {}>>\nstream\n", data.len()).as_bytes())?;
        self.write_raw(data)?;
        self.write_raw(b"\nendstream\nendobj\n")
    }

    fn write_image(&mut self, id: u32, img: &EmbeddedImage, smask: Option<u32>) -> io::Result<()> {
        let mut dict = format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent {}",
            img.width,
            img.height,
            color_space(&img.color_space),
            img.bits_per_component
        );
        match img.filter {
            StreamFilter::Dct => dict.push_str(" /Filter /DCTDecode"),
            StreamFilter::Flate => dict.push_str(" /Filter /FlateDecode"),
        }
        if let Some(p) = img.predictor {
            let _ = write!(
                dict,
                " /DecodeParms << /Predictor 15 /Colors {} /BitsPerComponent {} /Columns {} >>",
                p.colors, p.bits_per_component, p.columns
            );
        }
        if img.invert_cmyk {
            dict.push_str(" /Decode [1 0 1 0 1 0 1 0]");
        }
        if let Some(sm) = smask {
            let _ = write!(dict, " /SMask {sm} 0 R");
        }
        self.write_stream(id, &dict, &img.data)
    }

    /// Append one page showing `img` at its pixel size (1 px = 1 pt).
    pub fn add_image_page(&mut self, img: &EmbeddedImage) -> io::Result<()> {
        let smask_id = match &img.smask {
            Some(mask) => {
                let id = self.alloc();
                self.write_image(id, mask, None)?;
                Some(id)
            }
            None => None,
        };

        let image_id = self.alloc();
        self.write_image(image_id, img, smask_id)?;

        let (w, h) = (img.width, img.height);
        let content_id = self.alloc();
        let content = format!("q\n{w} 0 0 {h} 0 0 cm\n/Im0 Do\nQ\n");
        self.write_stream(content_id, "", content.as_bytes())?;

        let mut page = format!(
            "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {w} {h}] \
             /Resources << /XObject << /Im0 {image_id} 0 R >> >> /Contents {content_id} 0 R"
        );
        if img.rotation != 0 {
            let _ = write!(page, " /Rotate {}", img.rotation);
        }
        page.push_str(" >>");

        let page_id = self.alloc();
        self.write_object(page_id, &page)?;
        self.page_ids.push(page_id);
        Ok(())
    }

    /// Write the page tree, catalog, info, xref and trailer; return the sink.
    pub fn finish(mut self, info: &DocumentInfo) -> io::Result<W> {
        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        let count = self.page_ids.len();
        self.write_object(
            PAGES_ID,
            &format!("<< /Type /Pages /Kids [{kids}] /Count {count} >>"),
        )?;
        self.write_object(
            CATALOG_ID,
            &format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>"),
        )?;

        let info_id = self.alloc();
        let mut info_dict = format!(
            "<< /Producer {}",
            pdf_text(concat!("imgs2pdf ", env!("CARGO_PKG_VERSION")))
        );
        if let Some(title) = &info.title {
            let _ = write!(info_dict, " /Title {}", pdf_text(title));
        }
        info_dict.push_str(" >>");
        self.write_object(info_id, &info_dict)?;

        let xref_at = self.position;
        let size = self.offsets.len() + 1;
        let mut xref = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for (i, off) in self.offsets.iter().enumerate() {
            let off = off.ok_or_else(|| {
                io::Error::other(format!("object {} was never written", i + 1))
            })?;
            let _ = writeln!(xref, "{off:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {size} /Root {CATALOG_ID} 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n"
        );
        self.write_raw(xref.as_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn color_space(cs: &ColorSpace) -> String {
    match cs {
        ColorSpace::DeviceGray => "/DeviceGray".into(),
        ColorSpace::DeviceRgb => "/DeviceRGB".into(),
        ColorSpace::DeviceCmyk => "/DeviceCMYK".into(),
        ColorSpace::Indexed { palette } => {
            let hival = palette.len() / 3 - 1;
            format!("[/Indexed /DeviceRGB {hival} <{}>]", hex(palette))
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02X}");
        s
    })
}

/// Encode a PDF text string: literal for printable ASCII, UTF-16BE hex otherwise.
fn pdf_text(s: &str) -> String {
    if s.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('(');
        for c in s.chars() {
            if matches!(c, '(' | ')' | '\\') {
                out.push('\\');
            }
            out.push(c);
        }
        out.push(')');
        out
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend(s.encode_utf16().flat_map(u16::to_be_bytes));
        format!("<{}>", hex(&bytes))
    }
}

/// Stream `images` into `out`, one page each, in order.
///
/// `checkpoint(done, last)` runs before the first page (`done == 0`) and after
/// every page; returning an error stops the document there. Embedding and
/// write failures during a page name that page's file.
pub fn write_document<W, F>(
    out: W,
    images: &[ImageCandidate],
    info: &DocumentInfo,
    output_path: &Path,
    mut checkpoint: F,
) -> Result<(W, AssemblyReport), Img2PdfError>
where
    W: Write,
    F: FnMut(usize, Option<&ImageCandidate>) -> Result<(), Img2PdfError>,
{
    let write_failed = |source: io::Error| Img2PdfError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source,
    };

    let mut writer = PdfWriter::begin(out).map_err(write_failed)?;
    let mut report = AssemblyReport::default();

    checkpoint(0, None)?;
    for (i, candidate) in images.iter().enumerate() {
        let image = embed::prepare(candidate).map_err(|detail| Img2PdfError::Assembly {
            path: candidate.path.clone(),
            detail,
        })?;
        // Flush per page so a full disk is charged to the page that hit it.
        writer
            .add_image_page(&image)
            .and_then(|()| writer.flush())
            .map_err(|e| Img2PdfError::Assembly {
                path: candidate.path.clone(),
                detail: format!("write failed: {e}"),
            })?;

        if image.passthrough {
            report.embedded_direct += 1;
        } else {
            report.reencoded += 1;
        }
        drop(image);
        checkpoint(i + 1, Some(candidate))?;
    }

    report.pages = writer.page_count();
    let out = writer.finish(info).map_err(write_failed)?;
    Ok((out, report))
}

/// Assemble `images` into a PDF at `output_path`, atomically.
///
/// Creates the parent directory when missing. On any error the temporary
/// file is removed and `output_path` is left untouched.
pub fn assemble<F>(
    images: &[ImageCandidate],
    output_path: &Path,
    info: &DocumentInfo,
    checkpoint: F,
) -> Result<AssemblyReport, Img2PdfError>
where
    F: FnMut(usize, Option<&ImageCandidate>) -> Result<(), Img2PdfError>,
{
    if images.is_empty() {
        return Err(Img2PdfError::Internal("assembly called with no images".into()));
    }
    let write_failed = |source: io::Error| Img2PdfError::OutputWriteFailed {
        path: output_path.to_path_buf(),
        source,
    };

    let dir = match output_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_failed)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".imgs2pdf-")
        .suffix(".part")
        .tempfile_in(&dir)
        .map_err(write_failed)?;
    debug!("Writing to temp file {}", tmp.path().display());

    let (buffered, mut report) = write_document(
        BufWriter::new(tmp.as_file_mut()),
        images,
        info,
        output_path,
        checkpoint,
    )?;
    drop(buffered);

    tmp.as_file().sync_all().map_err(write_failed)?;
    let file = tmp
        .persist(output_path)
        .map_err(|e| write_failed(e.error))?;
    report.bytes = file.metadata().map(|m| m.len()).unwrap_or(0);

    info!(
        "Wrote {} pages ({} original, {} re-encoded) → {}",
        report.pages,
        report.embedded_direct,
        report.reencoded,
        output_path.display()
    );
    Ok(report)
}
