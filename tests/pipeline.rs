//! End-to-end pipeline tests.
//!
//! Fixtures are synthesised with the `image` crate into scratch directories,
//! and every produced PDF is parsed back with `lopdf`.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture

use futures::StreamExt;
use image::{ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imgs2pdf::{
    convert, convert_async, spawn_conversion, ConversionConfig, ConversionResult, FailureKind,
    PipelineEvent, ProgressEvent, ProgressSink, Selection, SelectionState, Stage,
};
use lopdf::Document;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Library logs go to the test output; set `RUST_LOG=imgs2pdf=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn rgb(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
    let p = dir.join(name);
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, 99]))
        .save(&p)
        .unwrap();
    p
}

fn corrupt(dir: &Path, name: &str) -> PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, b"definitely not pixels").unwrap();
    p
}

fn dir_state(dir: &Path, out: &Path) -> SelectionState {
    SelectionState::new(Selection::Directory(dir.to_path_buf()), out, "merged.pdf")
}

struct PageInfo {
    width: i64,
    height: i64,
    rotate: i64,
    filter: Vec<u8>,
    data: Vec<u8>,
}

fn read_pages(path: &Path) -> Vec<PageInfo> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
            let media: Vec<i64> = page
                .get(b"MediaBox")
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|o| o.as_i64().unwrap())
                .collect();
            let image_id = page
                .get(b"Resources")
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"XObject")
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"Im0")
                .unwrap()
                .as_reference()
                .unwrap();
            let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
            PageInfo {
                width: media[2],
                height: media[3],
                rotate: page
                    .get(b"Rotate")
                    .ok()
                    .and_then(|o| o.as_i64().ok())
                    .unwrap_or(0),
                filter: stream.dict.get(b"Filter").unwrap().as_name().unwrap().to_vec(),
                data: stream.content.clone(),
            }
        })
        .collect()
}

/// A JPEG whose APP1 Exif segment carries `orientation` (1..=8).
fn jpeg_with_orientation(dir: &Path, name: &str, w: u32, h: u32, orientation: u16) -> PathBuf {
    let mut plain = Vec::new();
    RgbImage::from_pixel(w, h, Rgb([40, 80, 160]))
        .write_to(&mut Cursor::new(&mut plain), ImageFormat::Jpeg)
        .unwrap();

    let mut app1 = b"Exif\x00\x00MM\x00\x2a\x00\x00\x00\x08\x00\x01".to_vec();
    app1.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    app1.extend_from_slice(&orientation.to_be_bytes());
    app1.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE1];
    data.extend_from_slice(&((app1.len() + 2) as u16).to_be_bytes());
    data.extend_from_slice(&app1);
    data.extend_from_slice(&plain[2..]);

    let p = dir.join(name);
    std::fs::write(&p, data).unwrap();
    p
}

fn entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Sink that records progress and runs a hook on every event.
struct Hooked<F: Fn(&ProgressEvent) + Send + Sync> {
    seen: Mutex<Vec<ProgressEvent>>,
    hook: F,
}

impl<F: Fn(&ProgressEvent) + Send + Sync> ProgressSink for Hooked<F> {
    fn on_progress(&self, event: &ProgressEvent) {
        self.seen.lock().unwrap().push(event.clone());
        (self.hook)(event);
    }
}

// ── Happy paths ──────────────────────────────────────────────────────────────

#[test]
fn test_three_valid_one_corrupt_gives_three_pages() {
    init_tracing();
    let src = TempDir::new().unwrap();
    rgb(src.path(), "a.jpg", 10, 8);
    rgb(src.path(), "b.png", 6, 4);
    rgb(src.path(), "c.bmp", 3, 5);
    let bad = corrupt(src.path(), "d.png");
    let out = src.path().join("result");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    assert!(result.is_success(), "{result:?}");

    let diag = result.diagnostics();
    assert_eq!(diag.exclusions.len(), 1);
    assert_eq!(diag.exclusions[0].path, bad);
    assert_eq!(diag.stats.candidates, 4);
    assert_eq!(diag.stats.valid, 3);
    assert_eq!(diag.stats.pages, 3);
    assert_eq!(diag.stats.embedded_direct, 2);
    assert_eq!(diag.stats.reencoded, 1);

    let pdf = result.output_path().unwrap();
    assert_eq!(pdf, out.join("merged.pdf"));
    assert_eq!(read_pages(pdf).len(), 3);
    assert_eq!(diag.stats.output_bytes, std::fs::metadata(pdf).unwrap().len());
}

#[test]
fn test_pages_follow_natural_order_and_pixel_size() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "img10.png", 10, 1);
    rgb(src.path(), "img2.png", 2, 1);
    rgb(src.path(), "img1.png", 1, 1);
    let out = src.path().join("out");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    let pages = read_pages(result.output_path().unwrap());
    let sizes: Vec<(i64, i64)> = pages.iter().map(|p| (p.width, p.height)).collect();
    assert_eq!(sizes, vec![(1, 1), (2, 1), (10, 1)]);
}

#[test]
fn test_jpeg_bytes_are_embedded_unchanged() {
    let src = TempDir::new().unwrap();
    let jpg = rgb(src.path(), "photo.jpg", 33, 17);
    let out = src.path().join("out");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    let pages = read_pages(result.output_path().unwrap());

    assert_eq!(pages.len(), 1);
    assert_eq!((pages[0].width, pages[0].height), (33, 17));
    assert_eq!(pages[0].filter, b"DCTDecode");
    assert_eq!(pages[0].data, std::fs::read(&jpg).unwrap());
}

#[test]
fn test_exif_orientation_rotates_page_not_pixels() {
    let src = TempDir::new().unwrap();
    let upright = rgb(src.path(), "1.jpg", 8, 4);
    let sideways = jpeg_with_orientation(src.path(), "2.jpg", 8, 4, 6);
    let out = src.path().join("out");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    let pages = read_pages(result.output_path().unwrap());

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].rotate, 0);
    assert_eq!(pages[1].rotate, 90);
    assert_eq!((pages[1].width, pages[1].height), (8, 4));
    assert_eq!(pages[0].data, std::fs::read(&upright).unwrap());
    assert_eq!(pages[1].data, std::fs::read(&sideways).unwrap());
}

#[test]
fn test_png_and_alpha_use_flate() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "1.png", 4, 4);
    RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 128]))
        .save(src.path().join("2.png"))
        .unwrap();
    image::GrayImage::from_pixel(2, 2, Luma([200]))
        .save(src.path().join("3.png"))
        .unwrap();
    let out = src.path().join("out");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    let pages = read_pages(result.output_path().unwrap());
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|p| p.filter == b"FlateDecode"));
    assert_eq!(result.diagnostics().stats.embedded_direct, 2);
    assert_eq!(result.diagnostics().stats.reencoded, 1);
}

#[test]
fn test_explicit_file_list_and_default_output() {
    let src = TempDir::new().unwrap();
    let a = rgb(src.path(), "a.png", 2, 2);
    let note = src.path().join("notes.txt");
    std::fs::write(&note, "hello").unwrap();

    let state = SelectionState::with_default_output(Selection::Files(vec![note.clone(), a]));
    assert!(state.output_filename().starts_with("merged_"));

    let result = convert(state, &ConversionConfig::default());
    let pdf = result.output_path().unwrap();
    assert!(pdf.starts_with(std::path::absolute(src.path()).unwrap().join("result")));
    assert_eq!(result.diagnostics().exclusions[0].path, note);
    assert_eq!(read_pages(pdf).len(), 1);
}

#[test]
fn test_recursive_collection_includes_subfolders() {
    let src = TempDir::new().unwrap();
    std::fs::create_dir(src.path().join("sub")).unwrap();
    rgb(src.path(), "1.png", 1, 1);
    rgb(&src.path().join("sub"), "2.png", 2, 2);
    let out = TempDir::new().unwrap();

    let flat = convert(dir_state(src.path(), out.path()), &ConversionConfig::default());
    assert_eq!(flat.diagnostics().stats.pages, 1);

    let config = ConversionConfig::builder().recursive(true).build().unwrap();
    let state = dir_state(src.path(), out.path()).with_output_filename("deep");
    let deep = convert(state, &config);
    assert_eq!(deep.diagnostics().stats.pages, 2);
}

#[test]
fn test_runs_are_byte_identical() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "1.jpg", 12, 9);
    rgb(src.path(), "2.png", 5, 5);
    let out = TempDir::new().unwrap();
    let config = ConversionConfig::builder().title("Scans").build().unwrap();

    let first = convert(dir_state(src.path(), out.path()).with_output_filename("a"), &config);
    let second = convert(dir_state(src.path(), out.path()).with_output_filename("b"), &config);

    let a = std::fs::read(first.output_path().unwrap()).unwrap();
    let b = std::fs::read(second.output_path().unwrap()).unwrap();
    assert_eq!(a, b);
}

// ── Selection and policy failures ────────────────────────────────────────────

#[test]
fn test_empty_directory_is_empty_selection() {
    let src = TempDir::new().unwrap();
    let out = src.path().join("result");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    assert_eq!(result.failure_kind(), Some(FailureKind::EmptySelection));
    assert!(!out.exists());
}

#[test]
fn test_all_corrupt_is_no_valid_images() {
    let src = TempDir::new().unwrap();
    corrupt(src.path(), "a.png");
    corrupt(src.path(), "b.jpg");
    let out = src.path().join("result");

    let result = convert(dir_state(src.path(), &out), &ConversionConfig::default());
    assert_eq!(result.failure_kind(), Some(FailureKind::NoValidImages));
    assert_eq!(result.diagnostics().exclusions.len(), 2);
    assert!(!out.exists());
}

#[test]
fn test_oversize_warns_but_still_converts() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "big.png", 20, 20);
    let out = src.path().join("out");
    let config = ConversionConfig::builder().max_pixels(100).build().unwrap();

    let result = convert(dir_state(src.path(), &out), &config);
    assert!(result.is_success(), "{result:?}");
    let warnings = &result.diagnostics().warnings;
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].to_string(), "big.png (20x20)");
    assert_eq!(read_pages(result.output_path().unwrap()).len(), 1);
}

#[test]
fn test_strict_resolution_blocks_assembly() {
    init_tracing();
    let src = TempDir::new().unwrap();
    let big = rgb(src.path(), "big.png", 20, 20);
    rgb(src.path(), "small.png", 2, 2);
    let out = src.path().join("out");
    let config = ConversionConfig::builder()
        .max_pixels(100)
        .strict_resolution(true)
        .build()
        .unwrap();

    let result = convert(dir_state(src.path(), &out), &config);
    match result {
        ConversionResult::Failure {
            kind,
            offending_path,
            ..
        } => {
            assert_eq!(kind, FailureKind::ResolutionLimitExceeded);
            assert_eq!(offending_path, Some(big));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!out.exists());
}

// ── Assembly failure and cancellation ────────────────────────────────────────

#[test]
fn test_image_vanishing_mid_assembly_names_it_and_leaves_nothing() {
    init_tracing();
    let src = TempDir::new().unwrap();
    rgb(src.path(), "1.png", 3, 3);
    let second = rgb(src.path(), "2.png", 3, 3);
    rgb(src.path(), "3.png", 3, 3);
    let out = TempDir::new().unwrap();

    let victim = second.clone();
    let sink = Arc::new(Hooked {
        seen: Mutex::new(Vec::new()),
        hook: move |e: &ProgressEvent| {
            if e.stage == Stage::Assembling && e.current_index == 1 {
                std::fs::remove_file(&victim).unwrap();
            }
        },
    });
    let config = ConversionConfig::builder().progress_sink(sink).build().unwrap();

    let result = convert(dir_state(src.path(), out.path()), &config);
    match result {
        ConversionResult::Failure {
            kind,
            offending_path,
            ..
        } => {
            assert_eq!(kind, FailureKind::Assembly);
            assert_eq!(offending_path, Some(second));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(entries(out.path()).is_empty(), "{:?}", entries(out.path()));
}

#[test]
fn test_cancel_between_images_discards_output() {
    init_tracing();
    let src = TempDir::new().unwrap();
    for i in 1..=4 {
        rgb(src.path(), &format!("{i}.png"), 2, 2);
    }
    let out = TempDir::new().unwrap();

    let config = ConversionConfig::default();
    let flag = config.cancellation.clone();
    let sink = Arc::new(Hooked {
        seen: Mutex::new(Vec::new()),
        hook: move |e: &ProgressEvent| {
            if e.stage == Stage::Assembling && e.current_index == 2 {
                flag.cancel();
            }
        },
    });
    let mut config = config;
    config.progress_sink = Some(sink.clone());

    let result = convert(dir_state(src.path(), out.path()), &config);
    assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
    assert!(entries(out.path()).is_empty());

    let assembled: Vec<usize> = sink
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.stage == Stage::Assembling)
        .map(|e| e.current_index)
        .collect();
    assert_eq!(assembled, vec![1, 2]);
}

// ── Async surfaces ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_async_matches_blocking() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "1.png", 2, 2);
    let out = TempDir::new().unwrap();

    let result = convert_async(dir_state(src.path(), out.path()), ConversionConfig::default()).await;
    assert!(result.is_success(), "{result:?}");
}

#[tokio::test]
async fn test_spawned_conversion_streams_events_in_order() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "a1.png", 2, 2);
    rgb(src.path(), "a2.png", 2, 2);
    rgb(src.path(), "a3.jpg", 2, 2);
    let out = TempDir::new().unwrap();

    let mut handle = spawn_conversion(dir_state(src.path(), out.path()), ConversionConfig::default());
    let events: Vec<PipelineEvent> = handle.events().collect().await;
    let result = handle.finish().await;
    assert!(result.is_success(), "{result:?}");

    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Stage(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            Stage::Collecting,
            Stage::Validating,
            Stage::PolicyCheck,
            Stage::Assembling,
            Stage::Done
        ]
    );

    let progress: Vec<(Stage, usize)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some((p.stage, p.current_index)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 6);
    assert_eq!(progress[2], (Stage::Validating, 3));
    assert_eq!(progress[5], (Stage::Assembling, 3));

    assert!(matches!(events.last(), Some(PipelineEvent::Finished(r)) if r.is_success()));
}

#[tokio::test]
async fn test_handle_cancel_before_work_starts() {
    let src = TempDir::new().unwrap();
    rgb(src.path(), "1.png", 2, 2);
    let out = TempDir::new().unwrap();

    let config = ConversionConfig::default();
    config.cancellation.cancel();
    let handle = spawn_conversion(dir_state(src.path(), out.path()), config);
    handle.cancel();

    let result = handle.finish().await;
    assert_eq!(result.failure_kind(), Some(FailureKind::Cancelled));
    assert!(entries(out.path()).is_empty());
}

#[test]
fn test_result_serialises_to_json() {
    let src = TempDir::new().unwrap();
    corrupt(src.path(), "x.png");
    let result = convert(
        dir_state(src.path(), &src.path().join("out")),
        &ConversionConfig::default(),
    );
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "failure");
    assert_eq!(json["kind"], "no_valid_images");
    assert_eq!(json["diagnostics"]["exclusions"][0]["reason"]["type"], "unsupported_format");
}
