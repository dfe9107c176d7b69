use crate::core::layer_store::LayerStore;
use crate::core::{ConfigProvider, Pipeline, Record, Storage, TransformResult};
use crate::domain::model::{Feature, Layer};
use crate::utils::error::{Result, WnvError};
use geo::{Geometry, Point};
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

pub const ADDRESSES_FILE: &str = "addresses.csv";
pub const GEOCODED_FILE: &str = "new_addresses.csv";
pub const POINT_TYPE: &str = "Residential";

/// Opt-out ETL: published spreadsheet -> geocoded table -> point layer.
///
/// The sheet must carry a street-address column. Each address is completed
/// with the configured locality suffix and sent to a one-line-address
/// geocoder returning `result.addressMatches[].coordinates.{x,y}`.
pub struct GSheetsEtl<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    layers: LayerStore,
    client: Client,
}

impl<S: Storage, C: ConfigProvider> GSheetsEtl<S, C> {
    pub fn new(storage: S, config: C, layers: LayerStore) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds()))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            storage,
            config,
            layers,
            client,
        }
    }

    fn geocode_url(&self, address: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(address.as_bytes()).collect();
        format!(
            "{}{}{}",
            self.config.geocoder_prefix_url(),
            encoded,
            self.config.geocoder_suffix_url()
        )
    }

    /// Returns `None` when the geocoder has no match for the address.
    async fn geocode(&self, address: &str) -> Result<Option<(f64, f64)>> {
        let url = self.geocode_url(address);
        tracing::debug!("Geocoding '{}' via {}", address, url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(WnvError::GeocodingError {
                address: address.to_string(),
                message: format!("geocoder returned HTTP {}", response.status()),
            });
        }

        let body: serde_json::Value = response.json().await?;
        let coordinates = body.pointer("/result/addressMatches/0/coordinates");
        let xy = coordinates.and_then(|c| Some((c.get("x")?.as_f64()?, c.get("y")?.as_f64()?)));
        Ok(xy)
    }
}

fn parse_sheet(text: &str) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let data: HashMap<String, serde_json::Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.clone(), serde_json::Value::String(v.to_string())))
            .collect();
        records.push(Record { data });
    }
    Ok(records)
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for GSheetsEtl<S, C> {
    async fn extract(&self) -> Result<Vec<Record>> {
        tracing::debug!("Requesting opt-out sheet: {}", self.config.remote_url());
        let response = self
            .client
            .get(self.config.remote_url())
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;
        self.storage
            .write_file(ADDRESSES_FILE, text.as_bytes())
            .await?;
        tracing::info!("Extract data file complete.");

        let records = parse_sheet(&text)?;
        let column = self.config.address_column();
        if let Some(first) = records.first() {
            if !first.data.contains_key(column) {
                return Err(WnvError::ProcessingError {
                    message: format!("opt-out sheet has no '{}' column", column),
                });
            }
        }
        Ok(records)
    }

    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult> {
        let column = self.config.address_column();
        let mut processed_records = Vec::new();
        let mut skipped = Vec::new();
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["X", "Y", "Type"])?;

        for record in data {
            let street = record.get_str(column).unwrap_or("").trim();
            if street.is_empty() {
                tracing::debug!("Skipping row without an address");
                continue;
            }

            let address = format!("{}{}", street, self.config.address_suffix());
            tracing::info!("{}", address);

            match self.geocode(&address).await {
                Ok(Some((x, y))) => {
                    writer.write_record([x.to_string(), y.to_string(), POINT_TYPE.to_string()])?;

                    let mut data = record.data.clone();
                    data.insert("X".to_string(), serde_json::json!(x));
                    data.insert("Y".to_string(), serde_json::json!(y));
                    data.insert("Type".to_string(), serde_json::json!(POINT_TYPE));
                    processed_records.push(Record { data });
                }
                Ok(None) => {
                    tracing::warn!("⚠️ No geocoder match for '{}'; address skipped", address);
                    skipped.push(address);
                }
                Err(e @ WnvError::GeocodingError { .. }) => {
                    tracing::warn!("⚠️ {}", e);
                    skipped.push(address);
                }
                Err(e) => return Err(e),
            }
        }

        let csv_bytes = writer
            .into_inner()
            .map_err(|e| WnvError::ProcessingError {
                message: format!("failed to finish geocoded table: {}", e),
            })?;
        let csv_output = String::from_utf8(csv_bytes).map_err(|e| WnvError::ProcessingError {
            message: format!("geocoded table is not UTF-8: {}", e),
        })?;

        tracing::info!("Transform data file complete.");
        Ok(TransformResult {
            processed_records,
            csv_output,
            skipped,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        self.storage
            .write_file(GEOCODED_FILE, result.csv_output.as_bytes())
            .await?;

        let column = self.config.address_column();
        let features: Vec<Feature> = result
            .processed_records
            .iter()
            .filter_map(|r| {
                let (x, y) = (r.get_f64("X")?, r.get_f64("Y")?);
                let mut feature = Feature::new(Geometry::Point(Point::new(x, y)))
                    .with_property("X", x)
                    .with_property("Y", y)
                    .with_property("Type", POINT_TYPE);
                if let Some(address) = r.get_str(column) {
                    feature = feature.with_property("address", address);
                }
                Some(feature)
            })
            .collect();

        let layer = Layer::new(self.config.avoid_points_layer(), features);
        let path = self.layers.save(&layer)?;
        tracing::info!("Total rows for feature class: {}", layer.len());

        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                WnvError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    struct MockConfig {
        remote_url: String,
        geocoder_prefix_url: String,
    }

    impl MockConfig {
        fn new(server: &MockServer) -> Self {
            Self {
                remote_url: server.url("/sheet.csv"),
                geocoder_prefix_url: server.url("/geocoder/locations/onelineaddress?address="),
            }
        }
    }

    impl ConfigProvider for MockConfig {
        fn remote_url(&self) -> &str {
            &self.remote_url
        }

        fn geocoder_prefix_url(&self) -> &str {
            &self.geocoder_prefix_url
        }

        fn geocoder_suffix_url(&self) -> &str {
            "&benchmark=2020&format=json"
        }

        fn address_column(&self) -> &str {
            "Street Address"
        }

        fn address_suffix(&self) -> &str {
            " Boulder CO"
        }

        fn avoid_points_layer(&self) -> &str {
            "avoid_points"
        }

        fn request_timeout_seconds(&self) -> u64 {
            5
        }
    }

    fn match_body(x: f64, y: f64) -> serde_json::Value {
        serde_json::json!({
            "result": {
                "input": {},
                "addressMatches": [
                    {"matchedAddress": "MATCH", "coordinates": {"x": x, "y": y}}
                ]
            }
        })
    }

    #[tokio::test]
    async fn test_extract_parses_sheet_and_saves_copy() {
        let server = MockServer::start();
        let sheet_mock = server.mock(|when, then| {
            when.method(GET).path("/sheet.csv");
            then.status(200)
                .header("Content-Type", "text/csv")
                .body("Timestamp,Street Address\n5/1/2024 10:00:00,1777 Broadway\n5/2/2024 11:00:00,2000 Pearl St\n");
        });

        let temp_dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(storage.clone(), MockConfig::new(&server), layers);

        let records = etl.extract().await.unwrap();

        sheet_mock.assert();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("Street Address"), Some("1777 Broadway"));
        assert!(storage.get_file(ADDRESSES_FILE).await.is_some());
    }

    #[tokio::test]
    async fn test_extract_requires_address_column() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/sheet.csv");
            then.status(200).body("Timestamp,Where\n5/1/2024,somewhere\n");
        });

        let temp_dir = TempDir::new().unwrap();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(MockStorage::new(), MockConfig::new(&server), layers);

        let err = etl.extract().await.unwrap_err();
        assert!(matches!(err, WnvError::ProcessingError { .. }));
    }

    #[tokio::test]
    async fn test_extract_http_failure_is_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/sheet.csv");
            then.status(500);
        });

        let temp_dir = TempDir::new().unwrap();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(MockStorage::new(), MockConfig::new(&server), layers);

        assert!(matches!(etl.extract().await, Err(WnvError::ApiError(_))));
    }

    #[tokio::test]
    async fn test_transform_geocodes_and_skips_misses() {
        let server = MockServer::start();
        let hit = server.mock(|when, then| {
            when.method(GET)
                .path("/geocoder/locations/onelineaddress")
                .query_param("address", "1777 Broadway Boulder CO")
                .query_param("format", "json");
            then.status(200).json_body(match_body(-105.2799, 40.0146));
        });
        let miss = server.mock(|when, then| {
            when.method(GET)
                .path("/geocoder/locations/onelineaddress")
                .query_param("address", "Nowhere Lane Boulder CO");
            then.status(200)
                .json_body(serde_json::json!({"result": {"addressMatches": []}}));
        });

        let temp_dir = TempDir::new().unwrap();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(MockStorage::new(), MockConfig::new(&server), layers);

        let rows = vec![
            Record {
                data: HashMap::from([("Street Address".to_string(), serde_json::json!("1777 Broadway"))]),
            },
            Record {
                data: HashMap::from([("Street Address".to_string(), serde_json::json!("Nowhere Lane"))]),
            },
            Record {
                data: HashMap::from([("Street Address".to_string(), serde_json::json!("  "))]),
            },
        ];

        let result = etl.transform(rows).await.unwrap();

        hit.assert();
        miss.assert();
        assert_eq!(result.processed_records.len(), 1);
        assert_eq!(result.skipped, vec!["Nowhere Lane Boulder CO".to_string()]);
        assert_eq!(
            result.csv_output,
            "X,Y,Type\n-105.2799,40.0146,Residential\n"
        );
    }

    #[tokio::test]
    async fn test_transform_continues_after_geocoder_server_error() {
        let server = MockServer::start();
        let broken = server.mock(|when, then| {
            when.method(GET)
                .path("/geocoder/locations/onelineaddress")
                .query_param("address", "Broken Rd Boulder CO");
            then.status(500).body("internal error");
        });
        let hit = server.mock(|when, then| {
            when.method(GET)
                .path("/geocoder/locations/onelineaddress")
                .query_param("address", "1777 Broadway Boulder CO");
            then.status(200).json_body(match_body(-105.2799, 40.0146));
        });

        let temp_dir = TempDir::new().unwrap();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(MockStorage::new(), MockConfig::new(&server), layers);

        let rows = vec![
            Record {
                data: HashMap::from([("Street Address".to_string(), serde_json::json!("Broken Rd"))]),
            },
            Record {
                data: HashMap::from([("Street Address".to_string(), serde_json::json!("1777 Broadway"))]),
            },
        ];

        let result = etl.transform(rows).await.unwrap();

        broken.assert();
        hit.assert();
        assert_eq!(result.skipped, vec!["Broken Rd Boulder CO".to_string()]);
        assert_eq!(result.processed_records.len(), 1);
        assert_eq!(
            result.csv_output,
            "X,Y,Type\n-105.2799,40.0146,Residential\n"
        );
    }

    #[tokio::test]
    async fn test_load_writes_table_and_point_layer() {
        let server = MockServer::start();
        let temp_dir = TempDir::new().unwrap();
        let storage = MockStorage::new();
        let layers = LayerStore::new(temp_dir.path(), temp_dir.path().join("ws"), true);
        let etl = GSheetsEtl::new(storage.clone(), MockConfig::new(&server), layers.clone());

        let mut data = HashMap::new();
        data.insert("Street Address".to_string(), serde_json::json!("1777 Broadway"));
        data.insert("X".to_string(), serde_json::json!(-105.2799));
        data.insert("Y".to_string(), serde_json::json!(40.0146));
        let result = TransformResult {
            processed_records: vec![Record { data }],
            csv_output: "X,Y,Type\n-105.2799,40.0146,Residential\n".to_string(),
            skipped: vec![],
        };

        let output = etl.load(result).await.unwrap();

        assert!(output.ends_with("avoid_points.geojson"));
        assert!(storage.get_file(GEOCODED_FILE).await.is_some());

        let layer = layers.resolve("avoid_points").unwrap();
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.features[0].point(), Some(Point::new(-105.2799, 40.0146)));
        assert_eq!(layer.features[0].properties["address"], serde_json::json!("1777 Broadway"));
    }
}
