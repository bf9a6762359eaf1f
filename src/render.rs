use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use image::{DynamicImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{info, warn};
use usvg::{Options, Tree};

use crate::compose;
use crate::feed::Article;
use crate::fetch::ImageFetcher;
use crate::fonts::{centered_baseline_px, CardFont};
use crate::layout::{autoshrink, pill_layout, LayoutBox};
use crate::settings::{RegionSettings, Settings};
use crate::template::Template;

const SLUG_MAX_CHARS: usize = 60;

/// How each card gets its base image.
#[derive(Debug, Clone)]
pub enum RenderMode {
    /// Composite the article photo into the template placeholder, then
    /// restore the template artwork via the overlay mask.
    FullComposite,
    /// Draw only the text layer onto a pre-rendered base image resolved by
    /// output name from this directory.
    TextOverlayOnly { base_dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub mode: RenderMode,
    pub out_dir: PathBuf,
    /// 0 = unlimited, otherwise only the first N feed records.
    pub limit: usize,
    pub jobs: usize,
    /// `false` reproduces the image-only variant: composite, no text pass.
    pub with_text: bool,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Rendered card paths in feed order, for the optional proof sheet.
    pub outputs: Vec<PathBuf>,
}

enum Outcome {
    Rendered(PathBuf),
    Skipped,
    Failed {
        reference: String,
        error: anyhow::Error,
    },
}

/// Renders one card per article against a fixed template. The template, its
/// overlay mask and placeholder rect are computed once at construction and
/// never re-scanned; everything here is read-only per article, which is what
/// makes `--jobs` safe without locking.
pub struct CardRenderer {
    template: Template,
    settings: Settings,
    font: CardFont,
}

impl CardRenderer {
    pub fn new(template: Template, settings: Settings, font: CardFont) -> Self {
        Self {
            template,
            settings,
            font,
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Template base, cover-fitted photo, overlay mask back on top.
    /// The draw order is load-bearing: the mask both restores template
    /// artwork over the photo and crops any non-rectangular overflow.
    pub fn compose_base(&self, photo: &DynamicImage) -> RgbaImage {
        let mut canvas = self.template.base().clone();
        compose::paste_cover(&mut canvas, photo, self.template.rect());
        compose::apply_overlay(&mut canvas, self.template.overlay());
        canvas
    }

    pub fn render_full(&self, article: &Article, photo: &DynamicImage, with_text: bool) -> Result<Vec<u8>> {
        let base = encode_png(&self.compose_base(photo))?;
        if !with_text {
            return Ok(base);
        }
        self.draw_text_layer(&base, article)
    }

    /// Text-only mode: the base was rendered earlier (by an image-only run or
    /// another tool); refuse bases that do not match the template dimensions,
    /// since every layout fraction is relative to them.
    pub fn render_text_only(&self, article: &Article, base_path: &Path) -> Result<Vec<u8>> {
        let base = image::open(base_path)
            .with_context(|| format!("failed to read base image: {}", base_path.display()))?
            .to_rgba8();
        if base.dimensions() != (self.template.width(), self.template.height()) {
            return Err(anyhow!(
                "base image {} is {}x{}, template is {}x{}",
                base_path.display(),
                base.width(),
                base.height(),
                self.template.width(),
                self.template.height()
            ));
        }
        let base = encode_png(&base)?;
        self.draw_text_layer(&base, article)
    }

    fn draw_text_layer(&self, base_png: &[u8], article: &Article) -> Result<Vec<u8>> {
        let svg = self.text_svg(base_png, article);
        rasterize_svg(&svg, &self.font)
    }

    /// Text pass the SVG way: the composed base as a data URI, the pill as a
    /// rounded rect, every text run centered with `text-anchor: middle`.
    /// Draw order: pill, title, date, source; each element skips when empty.
    fn text_svg(&self, base_png: &[u8], article: &Article) -> String {
        let width = self.template.width();
        let height = self.template.height();
        let encoded = BASE64.encode(base_png);
        let family = escape_xml(&self.font.family);
        let metrics = self.font.metrics.as_ref();

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push_str(&format!(
            r#"<image href="data:image/png;base64,{uri}" xlink:href="data:image/png;base64,{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
            uri = encoded,
            w = width,
            h = height
        ));

        if let Some(pill) = pill_layout(
            article.category(),
            self.template.rect(),
            width,
            height,
            &self.settings.pill,
            metrics,
        ) {
            let baseline =
                pill.y + pill.h / 2.0 + centered_baseline_px(pill.font_px as f32, metrics);
            svg.push_str(&format!(
                r##"<rect x="{x}" y="{y}" width="{w}" height="{h}" rx="{r}" ry="{r}" fill="{fill}"/>"##,
                x = pill.x,
                y = pill.y,
                w = pill.w,
                h = pill.h,
                r = pill.radius,
                fill = &self.settings.pill.fill
            ));
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" text-anchor="middle">{text}</text>"#,
                x = pill.center_x(),
                y = baseline,
                size = pill.font_px,
                color = &self.settings.pill.text_color,
                family = family,
                text = escape_xml(&pill.label)
            ));
        }

        let regions: [(&RegionSettings, &str); 3] = [
            (&self.settings.title, article.title()),
            (&self.settings.date, article.date()),
            (&self.settings.source, article.source()),
        ];
        for (region, text) in regions {
            self.push_region_text(&mut svg, region, text, &family);
        }

        svg.push_str("</svg>");
        svg
    }

    fn push_region_text(&self, svg: &mut String, region: &RegionSettings, text: &str, family: &str) {
        let width = self.template.width();
        let height = self.template.height();
        let bounds = LayoutBox::from_region(region, width, height);
        let dy_px = (region.shift * height as f32).round();
        let Some(block) = autoshrink(text, bounds, dy_px, region, width, self.font.metrics.as_ref())
        else {
            return;
        };

        let mut baseline = block.first_baseline;
        for line in &block.lines {
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}" text-anchor="middle">{text}</text>"#,
                x = bounds.center_x(),
                y = baseline,
                size = block.font_px,
                color = &region.color,
                family = family,
                text = escape_xml(line)
            ));
            baseline += block.line_advance;
        }
    }
}

/// Sequential by default; `jobs > 1` overlaps article renders, which is safe
/// because the template triple is read-only. `buffered` yields in order, so
/// progress logs stay in feed order either way.
pub async fn run_batch(
    renderer: &CardRenderer,
    fetcher: &ImageFetcher,
    articles: &[Article],
    options: &RenderOptions,
) -> Result<BatchSummary> {
    std::fs::create_dir_all(&options.out_dir).with_context(|| {
        format!(
            "failed to create output directory: {}",
            options.out_dir.display()
        )
    })?;

    let slice = if options.limit > 0 && options.limit < articles.len() {
        &articles[..options.limit]
    } else {
        articles
    };
    let total = slice.len();

    let mut summary = BatchSummary::default();
    let mut outcomes = futures_util::stream::iter(
        slice
            .iter()
            .enumerate()
            .map(|(index, article)| render_one(renderer, fetcher, options, index, article)),
    )
    .buffered(options.jobs.max(1));

    while let Some((index, outcome)) = outcomes.next().await {
        match outcome {
            Outcome::Rendered(path) => {
                info!(
                    "[{}/{}] ok -> {}",
                    index + 1,
                    total,
                    path.file_name().and_then(|name| name.to_str()).unwrap_or("card")
                );
                summary.rendered += 1;
                summary.outputs.push(path);
            }
            Outcome::Skipped => {
                info!("[{}/{}] skipped (no article_image)", index + 1, total);
                summary.skipped += 1;
            }
            Outcome::Failed { reference, error } => {
                warn!("[{}/{}] failed ({}): {:#}", index + 1, total, reference, error);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

async fn render_one(
    renderer: &CardRenderer,
    fetcher: &ImageFetcher,
    options: &RenderOptions,
    index: usize,
    article: &Article,
) -> (usize, Outcome) {
    let name = format!("{}.png", output_name(article.title(), index));

    let (reference, result) = match &options.mode {
        RenderMode::FullComposite => {
            let reference = article.image();
            if reference.is_empty() {
                return (index, Outcome::Skipped);
            }
            let result = async {
                let photo = fetcher.load(reference).await?;
                let bytes = renderer.render_full(article, &photo, options.with_text)?;
                write_card(&options.out_dir, &name, &bytes)
            }
            .await;
            (reference.to_string(), result)
        }
        RenderMode::TextOverlayOnly { base_dir } => {
            let base_path = base_dir.join(&name);
            let result = renderer
                .render_text_only(article, &base_path)
                .and_then(|bytes| write_card(&options.out_dir, &name, &bytes));
            (base_path.display().to_string(), result)
        }
    };

    match result {
        Ok(path) => (index, Outcome::Rendered(path)),
        Err(error) => (index, Outcome::Failed { reference, error }),
    }
}

/// Slugified title, or the zero-padded 1-based feed index when the title has
/// nothing usable.
pub(crate) fn output_name(title: &str, index: usize) -> String {
    slugify(title).unwrap_or_else(|| format!("{:03}", index + 1))
}

/// Unicode-alphanumeric runs survive (plus combining marks, so Bangla titles
/// keep their vowel signs); everything else collapses to one `-`. Trimmed and
/// capped.
fn slugify(title: &str) -> Option<String> {
    let mut slug = String::new();
    let mut gap = false;
    for ch in title.chars() {
        if keeps_in_slug(ch) {
            if gap && !slug.is_empty() {
                slug.push('-');
            }
            gap = false;
            slug.push(ch);
        } else {
            gap = true;
        }
    }
    let capped: String = slug.chars().take(SLUG_MAX_CHARS).collect();
    let trimmed = capped.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn keeps_in_slug(ch: char) -> bool {
    if ch.is_alphanumeric() {
        return true;
    }
    // Combining marks are word characters too; Bengali vowel signs live in
    // the Bengali block alongside the letters.
    matches!(ch as u32, 0x0300..=0x036F | 0x0980..=0x09FF)
}

/// Write to a tempfile in the output directory, then persist under the final
/// name, so a crash mid-write never leaves a truncated card behind.
fn write_card(out_dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let final_path = out_dir.join(name);
    let file = tempfile::Builder::new()
        .prefix(".card-")
        .suffix(".png")
        .tempfile_in(out_dir)
        .with_context(|| format!("failed to create tempfile in {}", out_dir.display()))?;
    std::fs::write(file.path(), bytes)
        .with_context(|| format!("failed to write card: {}", final_path.display()))?;
    file.persist(&final_path)
        .with_context(|| format!("failed to persist card: {}", final_path.display()))?;
    Ok(final_path)
}

fn rasterize_svg(svg: &str, font: &CardFont) -> Result<Vec<u8>> {
    let options = Options {
        fontdb: Arc::new(font.database()),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse card SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty card size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    encode_png(&image)
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode card PNG")?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
