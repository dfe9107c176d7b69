use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// Runs a pipeline's extract, transform and load in order.
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting ETL process...");

        tracing::info!("📥 Extracting opt-out addresses...");
        let raw_data = self.pipeline.extract().await?;
        tracing::info!("Extracted {} records", raw_data.len());
        self.monitor.log_stats("extract");

        tracing::info!("🔄 Geocoding addresses...");
        let transformed = self.pipeline.transform(raw_data).await?;
        tracing::info!(
            "Transformed {} records ({} unmatched)",
            transformed.processed_records.len(),
            transformed.skipped.len()
        );
        self.monitor.log_stats("transform");

        tracing::info!("💾 Loading opt-out points...");
        let output_path = self.pipeline.load(transformed).await?;
        tracing::info!("Output saved to: {}", output_path);
        self.monitor.log_stats("load");

        Ok(output_path)
    }
}
