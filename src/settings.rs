use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

/// Style and detection constants, all geometry as fractions of the template
/// dimensions so the same configuration scales to any resolution.
#[derive(Debug, Clone)]
pub struct Settings {
    pub template: TemplateSettings,
    pub pill: PillSettings,
    pub title: RegionSettings,
    pub date: RegionSettings,
    pub source: RegionSettings,
    pub fonts: FontSettings,
    pub social: SocialSettings,
    pub scorer: ScorerSettings,
}

#[derive(Debug, Clone)]
pub struct TemplateSettings {
    /// Pixels with r, g and b all at or below this value count as placeholder.
    pub black_threshold: u8,
    /// Inset applied to each side of the detected bounding box.
    pub pad_px: u32,
    pub fallback_width: f32,
    pub fallback_height: f32,
    pub fallback_top: f32,
}

#[derive(Debug, Clone)]
pub struct PillSettings {
    pub height: f32,
    pub min_width: f32,
    pub hpad: f32,
    pub radius: f32,
    pub top_offset: f32,
    pub shift: f32,
    pub fill: String,
    pub text_color: String,
    pub font_start: f32,
    pub font_min: f32,
}

#[derive(Debug, Clone)]
pub struct RegionSettings {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub color: String,
    pub font_start: f32,
    pub font_min: f32,
    pub line_height: f32,
    pub shift: f32,
}

#[derive(Debug, Clone)]
pub struct FontSettings {
    pub font_path: Option<String>,
    pub fallback_families: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SocialSettings {
    pub graph_base: String,
}

#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub page_name: String,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template: TemplateSettings {
                black_threshold: 50,
                pad_px: 2,
                fallback_width: 0.88,
                fallback_height: 0.46,
                fallback_top: 0.17,
            },
            pill: PillSettings {
                height: 0.055,
                min_width: 0.22,
                hpad: 0.028,
                radius: 0.02,
                top_offset: 0.018,
                shift: 0.0,
                fill: "#c62828".to_string(),
                text_color: "#ffffff".to_string(),
                font_start: 0.030,
                font_min: 0.018,
            },
            title: RegionSettings {
                left: 0.07,
                top: 0.72,
                right: 0.93,
                bottom: 0.86,
                color: "#111111".to_string(),
                font_start: 0.052,
                font_min: 0.028,
                line_height: 1.25,
                shift: 0.0,
            },
            date: RegionSettings {
                left: 0.07,
                top: 0.875,
                right: 0.93,
                bottom: 0.915,
                color: "#555555".to_string(),
                font_start: 0.026,
                font_min: 0.016,
                line_height: 1.2,
                shift: 0.0,
            },
            source: RegionSettings {
                left: 0.07,
                top: 0.92,
                right: 0.93,
                bottom: 0.955,
                color: "#555555".to_string(),
                font_start: 0.026,
                font_min: 0.016,
                line_height: 1.2,
                shift: 0.0,
            },
            fonts: FontSettings {
                font_path: None,
                fallback_families: vec![
                    "Noto Sans Bengali".to_string(),
                    "SolaimanLipi".to_string(),
                    "sans-serif".to_string(),
                ],
            },
            social: SocialSettings {
                graph_base: "https://graph.facebook.com/v19.0".to_string(),
            },
            scorer: ScorerSettings {
                page_name: "a Bangla news page".to_string(),
                language: "Bengali".to_string(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    template: Option<TemplateSection>,
    pill: Option<PillSection>,
    title: Option<RegionSection>,
    date: Option<RegionSection>,
    source: Option<RegionSection>,
    fonts: Option<FontsSection>,
    social: Option<SocialSection>,
    scorer: Option<ScorerSection>,
}

#[derive(Debug, Default, Deserialize)]
struct TemplateSection {
    black_threshold: Option<u8>,
    pad_px: Option<u32>,
    fallback_width: Option<f32>,
    fallback_height: Option<f32>,
    fallback_top: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PillSection {
    height: Option<f32>,
    min_width: Option<f32>,
    hpad: Option<f32>,
    radius: Option<f32>,
    top_offset: Option<f32>,
    shift: Option<f32>,
    fill: Option<String>,
    text_color: Option<String>,
    font_start: Option<f32>,
    font_min: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RegionSection {
    left: Option<f32>,
    top: Option<f32>,
    right: Option<f32>,
    bottom: Option<f32>,
    color: Option<String>,
    font_start: Option<f32>,
    font_min: Option<f32>,
    line_height: Option<f32>,
    shift: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontsSection {
    font_path: Option<String>,
    fallback_families: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SocialSection {
    graph_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScorerSection {
    page_name: Option<String>,
    language: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(section) = incoming.template {
            if let Some(value) = section.black_threshold {
                self.template.black_threshold = value;
            }
            if let Some(value) = section.pad_px {
                self.template.pad_px = value;
            }
            merge_fraction(&mut self.template.fallback_width, section.fallback_width);
            merge_fraction(&mut self.template.fallback_height, section.fallback_height);
            merge_fraction(&mut self.template.fallback_top, section.fallback_top);
        }
        if let Some(section) = incoming.pill {
            merge_fraction(&mut self.pill.height, section.height);
            merge_fraction(&mut self.pill.min_width, section.min_width);
            merge_offset(&mut self.pill.hpad, section.hpad);
            merge_offset(&mut self.pill.radius, section.radius);
            merge_offset(&mut self.pill.top_offset, section.top_offset);
            merge_shift(&mut self.pill.shift, section.shift);
            merge_text(&mut self.pill.fill, section.fill);
            merge_text(&mut self.pill.text_color, section.text_color);
            merge_fraction(&mut self.pill.font_start, section.font_start);
            merge_fraction(&mut self.pill.font_min, section.font_min);
        }
        merge_region(&mut self.title, incoming.title);
        merge_region(&mut self.date, incoming.date);
        merge_region(&mut self.source, incoming.source);
        if let Some(section) = incoming.fonts {
            if let Some(path) = section.font_path {
                if !path.trim().is_empty() {
                    self.fonts.font_path = Some(path);
                }
            }
            if let Some(families) = section.fallback_families {
                if !families.is_empty() {
                    self.fonts.fallback_families = families;
                }
            }
        }
        if let Some(section) = incoming.social {
            merge_text(&mut self.social.graph_base, section.graph_base);
        }
        if let Some(section) = incoming.scorer {
            merge_text(&mut self.scorer.page_name, section.page_name);
            merge_text(&mut self.scorer.language, section.language);
        }
    }
}

fn merge_region(target: &mut RegionSettings, section: Option<RegionSection>) {
    let Some(section) = section else {
        return;
    };
    merge_coord(&mut target.left, section.left);
    merge_coord(&mut target.top, section.top);
    merge_coord(&mut target.right, section.right);
    merge_coord(&mut target.bottom, section.bottom);
    merge_text(&mut target.color, section.color);
    merge_fraction(&mut target.font_start, section.font_start);
    merge_fraction(&mut target.font_min, section.font_min);
    merge_fraction(&mut target.line_height, section.line_height);
    merge_shift(&mut target.shift, section.shift);
}

fn merge_fraction(target: &mut f32, value: Option<f32>) {
    if let Some(value) = value {
        if value.is_finite() && value > 0.0 {
            *target = value;
        }
    }
}

// Paddings and offsets where zero is a legitimate override; sizes and
// fractions that must stay positive go through merge_fraction instead.
fn merge_offset(target: &mut f32, value: Option<f32>) {
    if let Some(value) = value {
        if value.is_finite() && value >= 0.0 {
            *target = value;
        }
    }
}

fn merge_coord(target: &mut f32, value: Option<f32>) {
    if let Some(value) = value {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            *target = value;
        }
    }
}

fn merge_shift(target: &mut f32, value: Option<f32>) {
    if let Some(value) = value {
        if value.is_finite() {
            *target = value;
        }
    }
}

fn merge_text(target: &mut String, value: Option<String>) {
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *target = value;
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".photocard-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;
    use std::io::Write;

    #[test]
    fn embedded_defaults_parse() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).unwrap();
        let mut settings = Settings::default();
        settings.merge(parsed);
        assert_eq!(settings.template.black_threshold, 50);
        assert_eq!(settings.template.pad_px, 2);
        assert!((settings.template.fallback_width - 0.88).abs() < 1e-6);
    }

    #[test]
    fn extra_file_overrides_defaults() {
        with_temp_home(|_| {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(
                file,
                "[pill]\nheight = 0.1\nfill = \"#000000\"\n\n[title]\ntop = 0.5"
            )
            .unwrap();
            let settings = load_settings(Some(file.path())).unwrap();
            assert!((settings.pill.height - 0.1).abs() < 1e-6);
            assert_eq!(settings.pill.fill, "#000000");
            assert!((settings.title.top - 0.5).abs() < 1e-6);
            // untouched values keep their defaults
            assert!((settings.pill.min_width - 0.22).abs() < 1e-6);
        });
    }

    #[test]
    fn zero_offsets_are_applied() {
        let parsed: SettingsFile =
            toml::from_str("[pill]\ntop_offset = 0.0\nradius = 0.0\nhpad = 0.0").unwrap();
        let mut settings = Settings::default();
        settings.merge(parsed);
        assert_eq!(settings.pill.top_offset, 0.0);
        assert_eq!(settings.pill.radius, 0.0);
        assert_eq!(settings.pill.hpad, 0.0);
        // zero still does not make sense for sizes
        let parsed: SettingsFile = toml::from_str("[pill]\nheight = 0.0").unwrap();
        settings.merge(parsed);
        assert!(settings.pill.height > 0.0);
    }

    #[test]
    fn negative_shift_is_accepted() {
        let parsed: SettingsFile = toml::from_str("[title]\nshift = -0.02").unwrap();
        let mut settings = Settings::default();
        settings.merge(parsed);
        assert!((settings.title.shift + 0.02).abs() < 1e-6);
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        with_temp_home(|home| {
            let missing = home.join("nope.toml");
            let err = load_settings(Some(&missing)).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }
}
