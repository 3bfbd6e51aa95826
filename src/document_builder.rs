//! Document Builder Module
//!
//! Assembles the captured frames into a PDF, one page per frame.

use crate::video_processor::FrameRecord;
use anyhow::{Context, Result};
use image::{ImageOutputFormat, RgbImage};
use log::{error, info, warn};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use std::fs;
use std::io::Cursor;
use std::path::Path;

// Standard PDF page sizes in points (1/72 inch).
const A4_WIDTH_PT: f32 = 595.0;
const A4_HEIGHT_PT: f32 = 842.0;
const JPEG_QUALITY: u8 = 95;

/// Builds a PDF from the given frames in the order given. Frames whose image
/// cannot be loaded are logged and skipped. Returns `false` when there was
/// nothing to write.
pub fn generate_pdf(frames: &[FrameRecord], output_path: &Path) -> Result<bool> {
    if frames.is_empty() {
        warn!("No frames to generate PDF from");
        return Ok(false);
    }

    let images: Vec<RgbImage> = frames
        .iter()
        .filter_map(|frame| match image::open(&frame.path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                error!("Error loading image {:?}: {}", frame.path, e);
                None
            }
        })
        .collect();
    if images.is_empty() {
        warn!("None of the {} frames could be loaded; PDF not written", frames.len());
        return Ok(false);
    }

    let mut pdf = Pdf::new();
    let mut next_id = 1;
    let mut alloc = || {
        let r = Ref::new(next_id);
        next_id += 1;
        r
    };

    let catalog_ref = alloc();
    let page_tree_ref = alloc();
    pdf.catalog(catalog_ref).pages(page_tree_ref);

    let page_refs: Vec<Ref> = images.iter().map(|_| alloc()).collect();
    for (image, page_ref) in images.iter().zip(&page_refs) {
        let content_ref = alloc();
        let image_ref = alloc();
        build_single_page(&mut pdf, *page_ref, page_tree_ref, content_ref, image_ref, image)?;
    }
    pdf.pages(page_tree_ref).kids(page_refs.iter().copied()).count(page_refs.len() as i32);

    if let Some(parent_dir) = output_path.parent() {
        fs::create_dir_all(parent_dir).context("Failed to create PDF parent directory")?;
    }
    fs::write(output_path, pdf.finish()).context("Failed to write PDF file")?;
    info!("PDF generated: {:?}", output_path);
    Ok(true)
}

/// Writes the page, its content stream and its JPEG image XObject.
fn build_single_page(
    pdf: &mut Pdf,
    page_ref: Ref,
    page_tree_ref: Ref,
    content_ref: Ref,
    image_ref: Ref,
    frame: &RgbImage,
) -> Result<()> {
    let image_name_str = format!("Frame{}", image_ref.get());
    let image_name = Name(image_name_str.as_bytes());

    let (image_width, image_height) = frame.dimensions();
    let (page_width, page_height) = page_size(image_width, image_height);
    let scale_factor = (page_width / image_width as f32).min(page_height / image_height as f32);
    let scaled_width = image_width as f32 * scale_factor;
    let scaled_height = image_height as f32 * scale_factor;
    let offset_x = (page_width - scaled_width) / 2.0;
    let offset_y = (page_height - scaled_height) / 2.0;

    let mut page = pdf.page(page_ref);
    page.media_box(Rect::new(0.0, 0.0, page_width, page_height));
    page.parent(page_tree_ref);
    page.contents(content_ref);
    page.resources().x_objects().pair(image_name, image_ref);
    page.finish();

    let mut content = Content::new();
    content.save_state();
    content.transform([scaled_width, 0.0, 0.0, scaled_height, offset_x, offset_y]);
    content.x_object(image_name);
    content.restore_state();
    pdf.stream(content_ref, &content.finish());

    let mut encoded_bytes = Vec::new();
    frame.write_to(&mut Cursor::new(&mut encoded_bytes), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;

    let mut image_xobject = pdf.image_xobject(image_ref, &encoded_bytes);
    image_xobject.filter(Filter::DctDecode);
    image_xobject.width(image_width as i32);
    image_xobject.height(image_height as i32);
    image_xobject.color_space().device_rgb();
    image_xobject.bits_per_component(8);
    image_xobject.finish();

    Ok(())
}

/// A4, turned to landscape for wide frames.
fn page_size(image_width: u32, image_height: u32) -> (f32, f32) {
    if image_width > image_height {
        (A4_HEIGHT_PT, A4_WIDTH_PT)
    } else {
        (A4_WIDTH_PT, A4_HEIGHT_PT)
    }
}
