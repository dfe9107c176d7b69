use crate::domain::model::{Record, TransformResult};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Settings the opt-out ETL needs, independent of where they were loaded from.
pub trait ConfigProvider: Send + Sync {
    /// Published spreadsheet, exported as CSV.
    fn remote_url(&self) -> &str;
    fn geocoder_prefix_url(&self) -> &str;
    fn geocoder_suffix_url(&self) -> &str;
    /// Column holding the street address in the spreadsheet.
    fn address_column(&self) -> &str;
    /// Appended to every street address before geocoding (city, state).
    fn address_suffix(&self) -> &str;
    /// Name of the point layer the load step produces.
    fn avoid_points_layer(&self) -> &str;
    fn request_timeout_seconds(&self) -> u64;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<Record>>;
    async fn transform(&self, data: Vec<Record>) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}
