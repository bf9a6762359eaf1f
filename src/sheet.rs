use anyhow::{anyhow, Context, Result};
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Bundle the rendered cards into a proof-sheet PDF, one page per card at its
/// native pixel size (72dpi mapping).
pub fn cards_to_pdf(cards: &[PathBuf], out: &Path) -> Result<()> {
    if cards.is_empty() {
        return Err(anyhow!("no rendered cards to bundle"));
    }

    let mut doc = None;
    let mut layers = Vec::new();

    for (idx, path) in cards.iter().enumerate() {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read card: {}", path.display()))?;
        // printpdf pins its own image crate version, so decode through its
        // re-export rather than ours.
        let image = printpdf::image_crate::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode card: {}", path.display()))?;
        let width_mm = px_to_mm(image.width());
        let height_mm = px_to_mm(image.height());

        if idx == 0 {
            let (doc_handle, page, layer) =
                PdfDocument::new("photocards", Mm(width_mm), Mm(height_mm), "Layer 1");
            doc = Some(doc_handle);
            layers.push((page, layer, image));
        } else if let Some(doc_handle) = doc.as_mut() {
            let (page, layer) =
                doc_handle.add_page(Mm(width_mm), Mm(height_mm), format!("Layer {}", idx + 1));
            layers.push((page, layer, image));
        }
    }

    let doc = doc.ok_or_else(|| anyhow!("no pages to render"))?;
    for (page, layer, image) in layers.into_iter() {
        let current_layer = doc.get_page(page).get_layer(layer);
        let pdf_image = Image::from_dynamic_image(&image);
        let transform = ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            rotate: None,
            scale_x: Some(1.0),
            scale_y: Some(1.0),
            dpi: Some(72.0),
        };
        pdf_image.add_to_layer(current_layer, transform);
    }

    let file = fs::File::create(out)
        .with_context(|| format!("failed to create proof sheet: {}", out.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    doc.save(&mut writer)
        .with_context(|| format!("failed to write proof sheet: {}", out.display()))?;
    info!("proof sheet with {} pages -> {}", cards.len(), out.display());
    Ok(())
}

fn px_to_mm(px: u32) -> f32 {
    let inches = px as f32 / 72.0;
    inches * 25.4
}
