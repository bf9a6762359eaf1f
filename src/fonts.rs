use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

/// Parsed font data plus the metrics needed for width measurement and
/// baseline placement. Cheap to clone; the raw bytes are shared.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Baseline offset below a box's vertical center that visually centers
    /// glyphs drawn at `font_px`.
    pub(crate) fn centered_baseline_offset(&self, font_px: f32) -> f32 {
        let units = self.units_per_em.max(1) as f32;
        (self.ascender as f32 + self.descender as f32) / 2.0 * (font_px / units)
    }
}

/// The font used for every text element on a card: explicit metrics when a
/// font file (or matching system face) was found, plus the family name to
/// put on the SVG text elements.
#[derive(Clone)]
pub struct CardFont {
    pub metrics: Option<FontMetrics>,
    pub family: String,
}

impl CardFont {
    /// Font database handed to resvg: system faces plus the loaded font data,
    /// so measurement and rasterization agree on the same face.
    pub fn database(&self) -> fontdb::Database {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(metrics) = &self.metrics {
            db.load_font_data(metrics.data().to_vec());
        }
        db
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Resolve the card font: an explicit font file wins, then the configured
/// fallback families against the system database, then a bare generic
/// family with estimate-based measurement.
pub fn resolve_card_font(font_path: Option<&Path>, fallback: &[String]) -> CardFont {
    if let Some(path) = font_path {
        match load_font_metrics(path) {
            Ok(metrics) => {
                let family = metrics
                    .family()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "sans-serif".to_string());
                return CardFont {
                    metrics: Some(metrics),
                    family,
                };
            }
            Err(err) => {
                warn!("{:#}; falling back to system fonts", err);
            }
        }
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for candidate in fallback {
        if let Ok(font) = load_font_from_family(&db, candidate) {
            return font;
        }
    }

    warn!("no usable font found; text width will be estimated");
    CardFont {
        metrics: None,
        family: "sans-serif".to_string(),
    }
}

pub(crate) fn measure_width_px(text: &str, font_px: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                if let Some(glyph) = face.glyph_index(ch) {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                } else {
                    advance = advance.saturating_add(font.space_advance as u32);
                }
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_px / units);
        }
    }
    estimate_text_width_units(text) * font_px
}

pub(crate) fn centered_baseline_px(font_px: f32, font: Option<&FontMetrics>) -> f32 {
    match font {
        Some(metrics) => metrics.centered_baseline_offset(font_px),
        None => font_px * 0.35,
    }
}

fn estimate_char_units(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(ch as u32, 0x0980..=0x09FF) {
        // Bengali block: conjuncts widen lines, but advances sit near 0.6em.
        0.62
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units).sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                descender: face.descender(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(metrics);
                }
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    if preferred_family.is_some() {
        return Err(anyhow!("font family not found in font file"));
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_from_family(db: &fontdb::Database, family: &str) -> Result<CardFont> {
    let is_generic = family.eq_ignore_ascii_case("sans-serif");
    let families = if is_generic {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, _face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, None)?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(CardFont {
        metrics: Some(metrics),
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_measures_ascii_words() {
        // 5 alnum chars at 0.55 units each, font 10px
        let width = measure_width_px("hello", 10.0, None);
        assert!((width - 27.5).abs() < 1e-3);
    }

    #[test]
    fn estimate_counts_bengali_block() {
        let width = measure_width_px("ঢাকা", 10.0, None);
        // four Bengali code points at 0.62 units
        assert!((width - 24.8).abs() < 1e-3);
    }

    #[test]
    fn default_baseline_offset_without_font() {
        assert!((centered_baseline_px(20.0, None) - 7.0).abs() < 1e-3);
    }

    #[test]
    fn missing_font_file_degrades_to_estimate() {
        let font = resolve_card_font(
            Some(Path::new("/nonexistent/font.ttf")),
            &["definitely-not-a-real-family-name".to_string()],
        );
        // either a system face or the bare generic fallback; both must
        // produce a usable family for the SVG text elements
        assert!(!font.family.is_empty());
    }
}
