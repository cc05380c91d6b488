//! Settings sections and file loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigLoadError;
use crate::algorithms::{MatchConfig, SizeClasses, TileLayout};
use crate::core::{DefectError, Result, TopBottom};

/// Paths searched by [`Settings::load_default`], in order.
pub const DEFAULT_PATHS: [&str; 2] = ["dakar.toml", "dakar.json"];

/// Full run configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Input and output locations
    #[serde(default)]
    pub data: DataSection,

    /// Tile grid geometry
    #[serde(default)]
    pub layout: TileLayout,

    /// Size range and excluded tiles
    #[serde(default)]
    pub filter: FilterSection,

    /// Before/after correspondence
    #[serde(default)]
    pub matching: MatchConfig,

    /// States compared by the `compare` command
    #[serde(default)]
    pub compare: CompareSection,

    /// Image cropping and compositing
    #[serde(default)]
    pub imagery: ImagerySection,

    /// Plot rendering
    #[serde(default)]
    pub plot: PlotSection,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Raw data root, laid out as `<root>/<state>/<foil>/`.
    pub root: PathBuf,
    /// Results root. Everything for one run goes under
    /// `<output>/<analysis_name>/`.
    pub output: PathBuf,
    pub analysis_name: String,
    /// Foils to process, per state.
    pub samples: BTreeMap<String, Vec<String>>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/Raw data"),
            output: PathBuf::from("result"),
            analysis_name: "Gap Analysis".to_string(),
            samples: BTreeMap::new(),
        }
    }
}

impl DataSection {
    /// `<output>/<analysis_name>`
    pub fn analysis_dir(&self) -> PathBuf {
        self.output.join(&self.analysis_name)
    }

    /// `<output>/<analysis_name>/<analysis_name>.csv`
    pub fn table_path(&self) -> PathBuf {
        self.analysis_dir()
            .join(format!("{}.csv", self.analysis_name))
    }

    /// `<root>/<state>/<foil>`
    pub fn sample_dir(&self, state: &str, foil: &str) -> PathBuf {
        self.root.join(state).join(foil)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSection {
    /// Smallest FM size kept in the table (inclusive).
    pub min_fm_size: f64,
    /// Largest FM size kept in the table (inclusive).
    pub max_fm_size: f64,
    /// Tiles skipped by the crop workflows.
    pub excluded_fov_numbers: Vec<u32>,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            min_fm_size: 100.0,
            max_fm_size: 700.0,
            excluded_fov_numbers: vec![25, 26, 29, 30],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagerySection {
    /// Crop half-size as a multiple of the defect's FM size.
    pub crop_scale: f64,
    /// Extra zoom-out applied to the context row of background crops.
    pub zoom_out_factor: f64,
    /// Most white images stitched into one background crop.
    pub max_background_images: usize,
    /// Width composites are resized to before saving.
    pub target_width: u32,
    /// Raw image file extensions, lowercase, without the dot.
    pub image_extensions: Vec<String>,
    /// RGB color of the defect window outline.
    pub outline_color: [u8; 3],
    pub outline_thickness: u32,
    /// Add a column to the exported table with the path of each row's
    /// white/red crop.
    pub link_crops_in_table: bool,
}

impl Default for ImagerySection {
    fn default() -> Self {
        Self {
            crop_scale: 3.0,
            zoom_out_factor: 4.0,
            max_background_images: 4,
            target_width: 960,
            image_extensions: vec!["jpeg".to_string(), "jpg".to_string(), "png".to_string()],
            outline_color: [255, 255, 0],
            outline_thickness: 2,
            link_crops_in_table: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSection {
    /// Size of one panel in SVG user units.
    pub panel_width: u32,
    pub panel_height: u32,
    /// Marker radius.
    pub marker_size: f64,
    pub top_color: String,
    pub bottom_color: String,
    /// Faces drawn in position plots.
    pub sides: Vec<TopBottom>,
    /// Image stretched under the plot area, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<PathBuf>,
    pub size_classes: SizeClasses,
}

impl Default for PlotSection {
    fn default() -> Self {
        Self {
            panel_width: 1700,
            panel_height: 1200,
            marker_size: 8.0,
            top_color: "red".to_string(),
            bottom_color: "blue".to_string(),
            sides: vec![TopBottom::Top, TopBottom::Bottom],
            background_image: None,
            size_classes: SizeClasses::default(),
        }
    }
}

impl Settings {
    /// Load from a `.toml` or `.json` file and validate.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        let settings = match extension(path).as_str() {
            "toml" => Self::from_toml(&contents)?,
            "json" => Self::from_json(&contents)?,
            other => return Err(ConfigLoadError::UnsupportedFormat(other.to_string())),
        };
        settings.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Load the first of [`DEFAULT_PATHS`] that exists, else defaults.
    pub fn load_default() -> std::result::Result<Self, ConfigLoadError> {
        for candidate in DEFAULT_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load(path);
            }
        }
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_toml(toml: &str) -> std::result::Result<Self, ConfigLoadError> {
        basic_toml::from_str(toml).map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, ConfigLoadError> {
        serde_json::from_str(json).map_err(|e| ConfigLoadError::Parse(e.to_string()))
    }

    /// Write settings back out, format chosen by extension.
    pub fn save(&self, path: &Path) -> std::result::Result<(), ConfigLoadError> {
        let contents = match extension(path).as_str() {
            "toml" => {
                basic_toml::to_string(self).map_err(|e| ConfigLoadError::Parse(e.to_string()))?
            }
            "json" => serde_json::to_string_pretty(self)
                .map_err(|e| ConfigLoadError::Parse(e.to_string()))?,
            other => return Err(ConfigLoadError::UnsupportedFormat(other.to_string())),
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Checks that must pass before any record is processed.
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.matching.validate()?;
        self.plot.size_classes.validate()?;

        let filter = &self.filter;
        if !(filter.min_fm_size.is_finite() && filter.max_fm_size.is_finite())
            || filter.min_fm_size > filter.max_fm_size
        {
            return Err(DefectError::invalid_config(format!(
                "FM size range [{}, {}] is empty",
                filter.min_fm_size, filter.max_fm_size
            )));
        }

        let imagery = &self.imagery;
        if !(imagery.crop_scale.is_finite() && imagery.crop_scale > 0.0) {
            return Err(DefectError::invalid_config("crop_scale must be positive"));
        }
        if !(imagery.zoom_out_factor.is_finite() && imagery.zoom_out_factor >= 1.0) {
            return Err(DefectError::invalid_config("zoom_out_factor must be at least 1"));
        }
        if imagery.target_width == 0 {
            return Err(DefectError::invalid_config("target_width must be positive"));
        }

        if self.plot.panel_width == 0 || self.plot.panel_height == 0 {
            return Err(DefectError::invalid_config("plot panel size must be positive"));
        }
        if self.data.analysis_name.trim().is_empty() {
            return Err(DefectError::invalid_config("analysis_name must not be empty"));
        }
        Ok(())
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{MarkerShape, PartitionKey};

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.layout.tile_pitch_x_px, 13264.0);
        assert_eq!(settings.matching.distance_tolerance, 0.02);
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
            [data]
            root = "raw"
            analysis_name = "Run 7"

            [data.samples]
            BeforeDetach = ["foil1", "foil2"]
            AfterDetach = ["foil1"]

            [layout]
            surface_width_px = 1000.0

            [matching]
            distance_tolerance = 0.05
            partition_keys = ["group_key"]

            [compare]
            before_state = "BeforeDetach"
            after_state = "AfterDetach"

            [imagery]
            link_crops_in_table = true
        "#;
        let settings = Settings::from_toml(toml).unwrap();
        assert_eq!(settings.data.root, PathBuf::from("raw"));
        assert_eq!(settings.data.output, PathBuf::from("result"));
        assert_eq!(settings.data.samples["BeforeDetach"], vec!["foil1", "foil2"]);
        assert_eq!(settings.layout.surface_width_px, 1000.0);
        assert_eq!(settings.layout.surface_height_px, 55080.0);
        assert_eq!(settings.matching.partition_keys, vec![PartitionKey::GroupKey]);
        assert_eq!(settings.compare.after_state.as_deref(), Some("AfterDetach"));
        assert!(settings.imagery.link_crops_in_table);
        assert_eq!(settings.imagery.crop_scale, 3.0);
        assert_eq!(
            settings.data.table_path(),
            PathBuf::from("result/Run 7/Run 7.csv")
        );
    }

    #[test]
    fn test_validate_rejects_zero_surface() {
        let settings = Settings::from_toml("[layout]\nsurface_height_px = 0.0\n").unwrap();
        assert!(matches!(
            settings.validate(),
            Err(DefectError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_size_range() {
        let mut settings = Settings::default();
        settings.filter.min_fm_size = 800.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dakar.toml");
        std::fs::write(&path, "[matching]\ndistance_tolerance = -1.0\n").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigLoadError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dakar.yaml");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigLoadError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_save_and_reload_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dakar.toml");

        let mut settings = Settings::default();
        settings
            .data
            .samples
            .insert("BeforeDetach".to_string(), vec!["foil1".to_string()]);
        settings.compare.before_state = Some("BeforeDetach".to_string());
        settings.plot.size_classes.fallback_marker = MarkerShape::Square;

        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_save_and_reload_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dakar.json");

        let mut settings = Settings::default();
        settings.plot.background_image = Some(PathBuf::from("data/original_resize.jpg"));
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).unwrap(), settings);
    }
}
