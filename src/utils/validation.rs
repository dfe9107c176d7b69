use crate::utils::error::{Result, WnvError};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(WnvError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_distance(field_name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Distance must be a positive number".to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WnvError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_one_of(field_name: &str, value: &str, allowed: &[&str]) -> Result<()> {
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        return Ok(());
    }
    Err(WnvError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: format!("Expected one of: {}", allowed.join(", ")),
    })
}

fn invalid_layer_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"[!@#$%^&*()+=;:'",.<>/?\\|\[\]{}`~]"#).expect("layer name pattern is valid")
    })
}

/// Layer names become file names in the workspace, so they follow geodatabase
/// naming: no spaces, no punctuation, no leading hyphen or digit.
pub fn validate_layer_name(name: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(WnvError::InvalidLayerName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };

    let Some(first) = name.chars().next() else {
        return reject("Layer name cannot be empty.");
    };
    if name.contains(' ') {
        return reject("Layer name cannot contain spaces.");
    }
    if invalid_layer_chars().is_match(name) {
        return reject("Layer name contains invalid characters.");
    }
    if first == '-' {
        return reject("Layer name cannot start with a hyphen.");
    }
    if first.is_ascii_digit() {
        return reject("Layer name cannot start with a number.");
    }
    Ok(())
}
