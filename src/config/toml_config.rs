use crate::core::geoprocessing::OverlayMode;
use crate::core::ConfigProvider;
use crate::domain::model::{BufferDistance, LinearUnit};
use crate::utils::error::{Result, WnvError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WnvConfig {
    pub project: ProjectConfig,
    pub layers: LayersConfig,
    pub buffer: BufferConfig,
    pub analysis: Option<AnalysisConfig>,
    pub etl: EtlConfig,
    pub map: MapConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Directory holding the input shapefiles.
    pub data_dir: String,
    /// Directory of generated GeoJSON layers.
    pub workspace: String,
    /// Destination of the PDF and the ETL tables.
    pub output_dir: String,
    pub log_dir: Option<String>,
    pub overwrite: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayersConfig {
    /// Breeding-ground layers to buffer and overlay.
    pub concern: Vec<String>,
    pub addresses: String,
    pub avoid_points: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    pub default_distance: f64,
    pub default_unit: String,
    pub valid_units: Option<Vec<String>>,
    pub distances: Option<HashMap<String, LayerBufferConfig>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerBufferConfig {
    pub distance: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub overlay: Option<String>,
    pub concern_layer: Option<String>,
    pub join_layer: Option<String>,
    pub spray_layer: Option<String>,
    pub spray_zone_layer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub enabled: Option<bool>,
    pub remote_url: String,
    pub geocoder_prefix_url: String,
    pub geocoder_suffix_url: String,
    pub address_column: Option<String>,
    pub address_suffix: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub title: String,
    pub subtitle: Option<String>,
    pub filename: Option<String>,
    pub date_format: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

pub const DEFAULT_CONCERN_LAYER: &str = "concern_zone";
pub const DEFAULT_JOIN_LAYER: &str = "address_in_concern_areas";
pub const DEFAULT_SPRAY_LAYER: &str = "addresses_to_spray";
pub const DEFAULT_SPRAY_ZONE_LAYER: &str = "spray_zone";
pub const DEFAULT_DATE_FORMAT: &str = "%B %d, %Y %I:%M %p";
pub const PAGE_SIZES: [&str; 4] = ["letter-landscape", "letter-portrait", "a4-landscape", "a4-portrait"];

impl WnvConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(WnvError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| WnvError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> String {
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("project.name", &self.project.name)?;
        validation::validate_path("project.data_dir", &self.project.data_dir)?;
        validation::validate_path("project.workspace", &self.project.workspace)?;
        validation::validate_path("project.output_dir", &self.project.output_dir)?;
        if let Some(log_dir) = &self.project.log_dir {
            validation::validate_path("project.log_dir", log_dir)?;
        }

        if self.layers.concern.is_empty() {
            return Err(WnvError::MissingConfigError {
                field: "layers.concern".to_string(),
            });
        }
        for name in self
            .layers
            .concern
            .iter()
            .chain([&self.layers.addresses, &self.layers.avoid_points])
        {
            validation::validate_layer_name(name)?;
        }
        for name in [
            self.concern_layer_name(),
            self.join_layer_name(),
            self.spray_layer_name(),
            self.spray_zone_layer_name(),
        ] {
            validation::validate_layer_name(name)?;
        }

        let valid_units = self.valid_units()?;
        let default = self.default_buffer()?;
        validation::validate_positive_distance("buffer.default_distance", default.value)?;
        if !valid_units.contains(&default.unit) {
            return Err(WnvError::InvalidConfigValueError {
                field: "buffer.default_unit".to_string(),
                value: self.buffer.default_unit.clone(),
                reason: "Default unit must be one of buffer.valid_units".to_string(),
            });
        }
        if let Some(distances) = &self.buffer.distances {
            for layer in distances.keys() {
                let distance = self.buffer_distance_for(layer)?;
                validation::validate_positive_distance(
                    &format!("buffer.distances.{}", layer),
                    distance.value,
                )?;
                if !valid_units.contains(&distance.unit) {
                    return Err(WnvError::InvalidConfigValueError {
                        field: format!("buffer.distances.{}.unit", layer),
                        value: distance.unit.to_string(),
                        reason: "Unit must be one of buffer.valid_units".to_string(),
                    });
                }
            }
        }

        self.overlay_mode()?;

        if self.etl_enabled() {
            validation::validate_url("etl.remote_url", &self.etl.remote_url)?;
            validation::validate_url("etl.geocoder_prefix_url", &self.etl.geocoder_prefix_url)?;
            validation::validate_non_empty_string("etl.address_column", self.address_column())?;
        }

        validation::validate_non_empty_string("map.title", &self.map.title)?;
        validation::validate_one_of("map.page", self.page_size(), &PAGE_SIZES)?;

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.project.data_dir)
    }

    pub fn workspace_dir(&self) -> PathBuf {
        PathBuf::from(&self.project.workspace)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.project.output_dir)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.project.log_dir.as_ref().map(PathBuf::from)
    }

    pub fn overwrite(&self) -> bool {
        self.project.overwrite.unwrap_or(true)
    }

    pub fn valid_units(&self) -> Result<Vec<LinearUnit>> {
        match &self.buffer.valid_units {
            Some(units) if !units.is_empty() => units.iter().map(|u| u.parse()).collect(),
            _ => Ok(LinearUnit::ALL.to_vec()),
        }
    }

    pub fn default_buffer(&self) -> Result<BufferDistance> {
        Ok(BufferDistance::new(
            self.buffer.default_distance,
            self.buffer.default_unit.parse()?,
        ))
    }

    /// Per-layer distance, falling back to the default distance and unit.
    pub fn buffer_distance_for(&self, layer: &str) -> Result<BufferDistance> {
        let default = self.default_buffer()?;
        match self.buffer.distances.as_ref().and_then(|d| d.get(layer)) {
            Some(cfg) => {
                let unit = match &cfg.unit {
                    Some(unit) => unit.parse()?,
                    None => default.unit,
                };
                Ok(BufferDistance::new(cfg.distance, unit))
            }
            None => Ok(default),
        }
    }

    fn analysis(&self) -> Option<&AnalysisConfig> {
        self.analysis.as_ref()
    }

    pub fn overlay_mode(&self) -> Result<OverlayMode> {
        match self.analysis().and_then(|a| a.overlay.as_deref()) {
            Some(mode) => mode.parse(),
            None => Ok(OverlayMode::Union),
        }
    }

    pub fn concern_layer_name(&self) -> &str {
        self.analysis()
            .and_then(|a| a.concern_layer.as_deref())
            .unwrap_or(DEFAULT_CONCERN_LAYER)
    }

    pub fn join_layer_name(&self) -> &str {
        self.analysis()
            .and_then(|a| a.join_layer.as_deref())
            .unwrap_or(DEFAULT_JOIN_LAYER)
    }

    pub fn spray_layer_name(&self) -> &str {
        self.analysis()
            .and_then(|a| a.spray_layer.as_deref())
            .unwrap_or(DEFAULT_SPRAY_LAYER)
    }

    pub fn spray_zone_layer_name(&self) -> &str {
        self.analysis()
            .and_then(|a| a.spray_zone_layer.as_deref())
            .unwrap_or(DEFAULT_SPRAY_ZONE_LAYER)
    }

    pub fn etl_enabled(&self) -> bool {
        self.etl.enabled.unwrap_or(true)
    }

    pub fn map_filename(&self) -> &str {
        self.map.filename.as_deref().unwrap_or("map_layout.pdf")
    }

    pub fn date_format(&self) -> &str {
        self.map.date_format.as_deref().unwrap_or(DEFAULT_DATE_FORMAT)
    }

    pub fn page_size(&self) -> &str {
        self.map.page.as_deref().unwrap_or("letter-landscape")
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }
}

impl ConfigProvider for WnvConfig {
    fn remote_url(&self) -> &str {
        &self.etl.remote_url
    }

    fn geocoder_prefix_url(&self) -> &str {
        &self.etl.geocoder_prefix_url
    }

    fn geocoder_suffix_url(&self) -> &str {
        &self.etl.geocoder_suffix_url
    }

    fn address_column(&self) -> &str {
        self.etl.address_column.as_deref().unwrap_or("Street Address")
    }

    fn address_suffix(&self) -> &str {
        self.etl.address_suffix.as_deref().unwrap_or("")
    }

    fn avoid_points_layer(&self) -> &str {
        &self.layers.avoid_points
    }

    fn request_timeout_seconds(&self) -> u64 {
        self.etl.timeout_seconds.unwrap_or(30)
    }
}

impl Validate for WnvConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASE: &str = r#"
[project]
name = "West Nile Virus Outbreak"
data_dir = "./data"
workspace = "./workspace"
output_dir = "./output"

[layers]
concern = ["Lakes_and_Reservoirs", "Wetlands", "Mosquito_Larval_Sites", "OSMP_Properties"]
addresses = "Boulder_Addresses"
avoid_points = "avoid_points"

[buffer]
default_distance = 1000.0
default_unit = "Feet"
valid_units = ["Feet", "Meters", "Miles"]

[buffer.distances.Wetlands]
distance = 500.0
unit = "Meters"

[buffer.distances.avoid_points]
distance = 1500.0

[etl]
remote_url = "https://docs.google.com/spreadsheets/d/e/abc/pub?output=csv"
geocoder_prefix_url = "https://geocoding.geo.census.gov/geocoder/locations/onelineaddress?address="
geocoder_suffix_url = "&benchmark=2020&format=json"
address_suffix = " Boulder CO"

[map]
title = "West Nile Virus Outbreak"
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = WnvConfig::from_toml_str(BASE).unwrap();

        assert_eq!(config.layers.concern.len(), 4);
        assert_eq!(config.overlay_mode().unwrap(), OverlayMode::Union);
        assert_eq!(config.concern_layer_name(), DEFAULT_CONCERN_LAYER);
        assert_eq!(config.address_column(), "Street Address");
        assert_eq!(config.map_filename(), "map_layout.pdf");
        assert!(config.etl_enabled());
        assert!(config.overwrite());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_distance_lookup() {
        let config = WnvConfig::from_toml_str(BASE).unwrap();

        let wetlands = config.buffer_distance_for("Wetlands").unwrap();
        assert_eq!(wetlands, BufferDistance::new(500.0, LinearUnit::Meters));

        let avoid = config.buffer_distance_for("avoid_points").unwrap();
        assert_eq!(avoid, BufferDistance::new(1500.0, LinearUnit::Feet));

        let lakes = config.buffer_distance_for("Lakes_and_Reservoirs").unwrap();
        assert_eq!(lakes, BufferDistance::new(1000.0, LinearUnit::Feet));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WNV_TEST_SHEET_URL", "https://sheets.example.com/export.csv");

        let content = BASE.replace(
            "https://docs.google.com/spreadsheets/d/e/abc/pub?output=csv",
            "${WNV_TEST_SHEET_URL}",
        );
        let config = WnvConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.etl.remote_url, "https://sheets.example.com/export.csv");

        std::env::remove_var("WNV_TEST_SHEET_URL");
    }

    #[test]
    fn test_validation_rejects_unit_outside_valid_units() {
        let content = BASE.replace("unit = \"Meters\"", "unit = \"Kilometers\"");
        let config = WnvConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_layer_name() {
        let content = BASE.replace("\"Wetlands\", ", "\"Wet lands\", ");
        let config = WnvConfig::from_toml_str(&content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(WnvError::InvalidLayerName { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_overlay() {
        let content = format!("{}\n[analysis]\noverlay = \"erase\"\n", BASE);
        let config = WnvConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disabled_etl_skips_url_checks() {
        let content = BASE
            .replace("https://docs.google.com/spreadsheets/d/e/abc/pub?output=csv", "")
            .replace("[etl]\n", "[etl]\nenabled = false\n");
        let config = WnvConfig::from_toml_str(&content).unwrap();
        assert!(!config.etl_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASE.as_bytes()).unwrap();

        let config = WnvConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.project.name, "West Nile Virus Outbreak");
        assert_eq!(config.workspace_dir(), PathBuf::from("./workspace"));
    }
}
