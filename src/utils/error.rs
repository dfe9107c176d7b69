use thiserror::Error;

#[derive(Error, Debug)]
pub enum WnvError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJsonError(#[from] geojson::Error),

    #[error("Shapefile error: {0}")]
    ShapefileError(#[from] shapefile::Error),

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Layer '{name}' was not found in the workspace or data directory")]
    LayerNotFound { name: String },

    #[error("Layer '{name}' already exists and overwriting is disabled")]
    LayerExists { name: String },

    #[error("Invalid layer name '{name}': {reason}")]
    InvalidLayerName { name: String, reason: String },

    #[error("Geometry error during {operation}: {message}")]
    GeometryError { operation: String, message: String },

    #[error("Geocoding failed for '{address}': {message}")]
    GeocodingError { address: String, message: String },

    #[error("Map rendering error: {message}")]
    RenderError { message: String },

    #[error("Input error: {message}")]
    PromptError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Io,
    Configuration,
    Geometry,
    Rendering,
    UserInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit status for a run that failed with this severity. Never 0.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low | ErrorSeverity::High => 1,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl WnvError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WnvError::ApiError(_) | WnvError::GeocodingError { .. } => ErrorCategory::Network,
            WnvError::CsvError(_)
            | WnvError::SerializationError(_)
            | WnvError::GeoJsonError(_)
            | WnvError::ShapefileError(_)
            | WnvError::ProcessingError { .. } => ErrorCategory::Data,
            WnvError::IoError(_) | WnvError::LayerNotFound { .. } | WnvError::LayerExists { .. } => {
                ErrorCategory::Io
            }
            WnvError::ConfigValidationError { .. }
            | WnvError::InvalidConfigValueError { .. }
            | WnvError::MissingConfigError { .. } => ErrorCategory::Configuration,
            WnvError::GeometryError { .. } => ErrorCategory::Geometry,
            WnvError::RenderError { .. } => ErrorCategory::Rendering,
            WnvError::InvalidLayerName { .. } | WnvError::PromptError { .. } => {
                ErrorCategory::UserInput
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if let WnvError::PromptError { .. } = self {
            return ErrorSeverity::Medium;
        }
        match self.category() {
            ErrorCategory::UserInput => ErrorSeverity::Low,
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Geometry | ErrorCategory::Rendering => {
                ErrorSeverity::High
            }
            ErrorCategory::Io | ErrorCategory::Configuration => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            WnvError::ApiError(_) => "Check the network connection and that the spreadsheet is published as CSV",
            WnvError::GeocodingError { .. } => "Verify the geocoder URLs and the address column in the opt-out sheet",
            WnvError::CsvError(_) => "Make sure the opt-out sheet is exported as comma separated values",
            WnvError::IoError(_) => "Check file permissions and that the output directories are writable",
            WnvError::SerializationError(_) | WnvError::GeoJsonError(_) => {
                "Remove the damaged workspace layer and run again"
            }
            WnvError::ShapefileError(_) => "Make sure the .shp, .shx and .dbf files sit together in the data directory",
            WnvError::LayerNotFound { .. } => "Check the layer names in [layers] against the data directory",
            WnvError::LayerExists { .. } => "Set project.overwrite = true or pick another output layer name",
            WnvError::InvalidLayerName { .. } => {
                "Use letters, digits and underscores only, starting with a letter"
            }
            WnvError::ConfigValidationError { .. }
            | WnvError::InvalidConfigValueError { .. }
            | WnvError::MissingConfigError { .. } => "Review the configuration file against wnv.example.toml",
            WnvError::GeometryError { .. } => "Inspect the input layers for invalid or empty geometries",
            WnvError::RenderError { .. } => "Check the [map] section and that the output directory exists",
            WnvError::PromptError { .. } => "Re-run and answer the prompts, or run without --interactive",
            WnvError::ProcessingError { .. } => "Re-run with --verbose and check wnv.log for details",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach a remote service: {}", self),
            ErrorCategory::Data => format!("Input data could not be processed: {}", self),
            ErrorCategory::Io => format!("File problem: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Geometry => format!("Spatial analysis failed: {}", self),
            ErrorCategory::Rendering => format!("Map export failed: {}", self),
            ErrorCategory::UserInput => format!("Invalid input: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, WnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_errors_are_io_and_critical() {
        let err = WnvError::LayerNotFound {
            name: "Wetlands".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Io);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("Wetlands"));
    }

    #[test]
    fn test_geocoding_error_is_medium() {
        let err = WnvError::GeocodingError {
            address: "1 Main St".to_string(),
            message: "no match".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(!err.recovery_suggestion().is_empty());
    }

    #[test]
    fn test_invalid_layer_name_is_low() {
        let err = WnvError::InvalidLayerName {
            name: "1abc".to_string(),
            reason: "starts with a number".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_every_failure_exits_nonzero() {
        let low = WnvError::InvalidLayerName {
            name: "1abc".to_string(),
            reason: "starts with a number".to_string(),
        };
        assert_eq!(low.severity().exit_code(), 1);

        for severity in [
            ErrorSeverity::Low,
            ErrorSeverity::Medium,
            ErrorSeverity::High,
            ErrorSeverity::Critical,
        ] {
            assert_ne!(severity.exit_code(), 0);
        }
        assert_eq!(ErrorSeverity::Medium.exit_code(), 2);
        assert_eq!(ErrorSeverity::Critical.exit_code(), 3);
    }
}
