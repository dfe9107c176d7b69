use geo::{BoundingRect, Geometry, Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::utils::error::WnvError;

/// One row flowing through the opt-out ETL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Geocoded rows, each carrying `X`, `Y` and `Type`.
    pub processed_records: Vec<Record>,
    /// `X,Y,Type` table written as `new_addresses.csv`.
    pub csv_output: String,
    /// Addresses the geocoder could not match.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearUnit {
    Feet,
    Yards,
    Meters,
    Kilometers,
    Miles,
    NauticalMiles,
}

impl LinearUnit {
    pub const ALL: [LinearUnit; 6] = [
        LinearUnit::Feet,
        LinearUnit::Yards,
        LinearUnit::Meters,
        LinearUnit::Kilometers,
        LinearUnit::Miles,
        LinearUnit::NauticalMiles,
    ];

    pub fn meters_per_unit(self) -> f64 {
        match self {
            LinearUnit::Feet => 0.3048,
            LinearUnit::Yards => 0.9144,
            LinearUnit::Meters => 1.0,
            LinearUnit::Kilometers => 1000.0,
            LinearUnit::Miles => 1609.344,
            LinearUnit::NauticalMiles => 1852.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LinearUnit::Feet => "Feet",
            LinearUnit::Yards => "Yards",
            LinearUnit::Meters => "Meters",
            LinearUnit::Kilometers => "Kilometers",
            LinearUnit::Miles => "Miles",
            LinearUnit::NauticalMiles => "NauticalMiles",
        }
    }
}

impl fmt::Display for LinearUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinearUnit {
    type Err = WnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "feet" | "foot" | "ft" => Ok(LinearUnit::Feet),
            "yards" | "yard" | "yd" => Ok(LinearUnit::Yards),
            "meters" | "meter" | "metres" | "metre" | "m" => Ok(LinearUnit::Meters),
            "kilometers" | "kilometer" | "kilometres" | "km" => Ok(LinearUnit::Kilometers),
            "miles" | "mile" | "mi" => Ok(LinearUnit::Miles),
            "nauticalmiles" | "nauticalmile" | "nmi" => Ok(LinearUnit::NauticalMiles),
            _ => Err(WnvError::InvalidConfigValueError {
                field: "unit".to_string(),
                value: s.to_string(),
                reason: format!(
                    "Unknown linear unit. Known units: {}",
                    LinearUnit::ALL.map(LinearUnit::name).join(", ")
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferDistance {
    pub value: f64,
    pub unit: LinearUnit,
}

impl BufferDistance {
    pub fn new(value: f64, unit: LinearUnit) -> Self {
        Self { value, unit }
    }

    pub fn to_meters(&self) -> f64 {
        self.value * self.unit.meters_per_unit()
    }
}

impl fmt::Display for BufferDistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn point(&self) -> Option<Point<f64>> {
        match &self.geometry {
            Geometry::Point(p) => Some(*p),
            Geometry::MultiPoint(mp) if mp.0.len() == 1 => Some(mp.0[0]),
            _ => None,
        }
    }
}

/// A named feature collection; the unit of work of every geoprocessing step.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn new(name: impl Into<String>, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_parsing_is_lenient() {
        assert_eq!("Feet".parse::<LinearUnit>().unwrap(), LinearUnit::Feet);
        assert_eq!("  meters ".parse::<LinearUnit>().unwrap(), LinearUnit::Meters);
        assert_eq!("Nautical Miles".parse::<LinearUnit>().unwrap(), LinearUnit::NauticalMiles);
        assert_eq!("KM".parse::<LinearUnit>().unwrap(), LinearUnit::Kilometers);
        assert!("furlongs".parse::<LinearUnit>().is_err());
    }

    #[test]
    fn test_buffer_distance_to_meters() {
        let d = BufferDistance::new(1000.0, LinearUnit::Feet);
        assert!((d.to_meters() - 304.8).abs() < 1e-9);
        assert_eq!(d.to_string(), "1000 Feet");

        let mi = BufferDistance::new(1.0, LinearUnit::Miles);
        assert!((mi.to_meters() - 1609.344).abs() < 1e-9);
    }

    #[test]
    fn test_layer_bounding_rect_spans_all_features() {
        let layer = Layer::new(
            "pts",
            vec![
                Feature::new(Geometry::Point(Point::new(-105.3, 40.0))),
                Feature::new(Geometry::Point(Point::new(-105.2, 40.1))),
            ],
        );
        let rect = layer.bounding_rect().unwrap();
        assert_eq!(rect.min().x, -105.3);
        assert_eq!(rect.max().y, 40.1);
        assert!(Layer::new("empty", vec![]).bounding_rect().is_none());
    }
}
