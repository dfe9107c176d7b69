//! The outbreak workflow: buffer the breeding grounds, overlay them into a
//! concern zone, find the addresses inside it, remove citizen opt-outs and
//! export the resulting spray map.

use geo::MultiPolygon;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::adapters::LocalStorage;
use crate::app::inputs::AnalysisInputs;
use crate::app::map_export::{export_map, MapLayer, MapLayout, PageSize, Rgb, Symbol};
use crate::app::pipelines::gsheets_etl::GSheetsEtl;
use crate::config::WnvConfig;
use crate::core::etl::EtlEngine;
use crate::core::geoprocessing::{
    buffer_layer, count_where, erase_points, erase_zone, overlay, select_by_location,
    spatial_join_within, zone_area_sq_meters, zone_layer, JOIN_COUNT_FIELD,
};
use crate::core::layer_store::LayerStore;
use crate::core::projection::LocalProjection;
use crate::domain::model::Layer;
use crate::utils::error::{Result, WnvError};
use crate::utils::monitor::SystemMonitor;

pub const CAUTION: &str =
    "CAUTION: all layers that are generated in this script may be overwritten or removed.";

/// Run-level switches coming from the command line.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    pub skip_etl: bool,
    pub subtitle: Option<String>,
    pub monitor: bool,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub output_layer: Option<String>,
    pub feature_count: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub addresses_in_concern: usize,
    pub opt_out_points: usize,
    pub addresses_to_notify: usize,
    pub concern_area_sq_meters: f64,
    pub map_path: PathBuf,
    pub steps: Vec<StepResult>,
}

impl WorkflowReport {
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn execution_summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        summary.insert("total_steps".to_string(), json!(self.steps.len()));
        summary.insert(
            "total_duration_ms".to_string(),
            json!(self.total_duration().as_millis() as u64),
        );
        summary.insert("addresses_in_concern".to_string(), json!(self.addresses_in_concern));
        summary.insert("opt_out_points".to_string(), json!(self.opt_out_points));
        summary.insert("addresses_to_notify".to_string(), json!(self.addresses_to_notify));
        summary.insert(
            "concern_area_sq_km".to_string(),
            json!(self.concern_area_sq_meters / 1_000_000.0),
        );
        summary.insert(
            "map_path".to_string(),
            json!(self.map_path.display().to_string()),
        );

        let step_names: Vec<serde_json::Value> =
            self.steps.iter().map(|s| json!(s.name)).collect();
        summary.insert("steps".to_string(), serde_json::Value::Array(step_names));
        summary
    }
}

/// Human-readable plan of what a run would do, used by `--dry-run`.
pub fn describe_plan(config: &WnvConfig, options: &WorkflowOptions) -> Result<Vec<String>> {
    let mut plan = Vec::new();
    for layer in &config.layers.concern {
        plan.push(format!(
            "buffer '{}' by {} -> buff_{}",
            layer,
            config.buffer_distance_for(layer)?,
            layer
        ));
    }
    plan.push(format!(
        "{} buffers -> {}",
        config.overlay_mode()?,
        config.concern_layer_name()
    ));
    plan.push(format!(
        "spatial join '{}' within {} -> {}",
        config.layers.addresses,
        config.concern_layer_name(),
        config.join_layer_name()
    ));
    if options.skip_etl || !config.etl_enabled() {
        plan.push(format!("use existing opt-out layer '{}'", config.layers.avoid_points));
    } else {
        plan.push(format!(
            "fetch opt-outs from {} -> {}",
            config.etl.remote_url, config.layers.avoid_points
        ));
    }
    plan.push(format!(
        "buffer '{}' by {} -> buff_{}",
        config.layers.avoid_points,
        config.buffer_distance_for(&config.layers.avoid_points)?,
        config.layers.avoid_points
    ));
    plan.push(format!(
        "erase opt-out buffer -> {}, {}",
        config.spray_layer_name(),
        config.spray_zone_layer_name()
    ));
    plan.push(format!(
        "export map -> {}",
        config.output_dir().join(config.map_filename()).display()
    ));
    Ok(plan)
}

fn format_date(format: &str) -> Result<String> {
    let mut text = String::new();
    write!(text, "{}", chrono::Local::now().format(format)).map_err(|_| {
        WnvError::InvalidConfigValueError {
            field: "map.date_format".to_string(),
            value: format.to_string(),
            reason: "Not a valid strftime format".to_string(),
        }
    })?;
    Ok(text)
}

pub struct OutbreakWorkflow<I: AnalysisInputs> {
    config: WnvConfig,
    store: LayerStore,
    inputs: I,
    options: WorkflowOptions,
    monitor: SystemMonitor,
    steps: Vec<StepResult>,
}

impl<I: AnalysisInputs> OutbreakWorkflow<I> {
    pub fn new(config: WnvConfig, inputs: I, options: WorkflowOptions) -> Self {
        let store = LayerStore::new(config.data_dir(), config.workspace_dir(), config.overwrite());
        let monitor = SystemMonitor::new(options.monitor || config.monitoring_enabled());
        Self {
            config,
            store,
            inputs,
            options,
            monitor,
            steps: Vec::new(),
        }
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    fn record_step(&mut self, name: &str, output_layer: Option<&str>, feature_count: usize, started: Instant) {
        let step = StepResult {
            name: name.to_string(),
            output_layer: output_layer.map(str::to_string),
            feature_count,
            duration: started.elapsed(),
        };
        tracing::info!(
            "✅ Step completed: {} (features: {}, duration: {:?})",
            step.name,
            step.feature_count,
            step.duration
        );
        self.monitor.log_stats(name);
        self.steps.push(step);
    }

    fn save_zone(&self, name: &str, zone: &MultiPolygon<f64>) -> Result<()> {
        self.store.save(&zone_layer(name, zone))?;
        Ok(())
    }

    pub async fn run(mut self) -> Result<WorkflowReport> {
        tracing::warn!("{}", CAUTION);
        std::fs::create_dir_all(self.config.workspace_dir())?;
        std::fs::create_dir_all(self.config.output_dir())?;

        let addresses = self.store.resolve(&self.config.layers.addresses)?;
        let extent = addresses.bounding_rect().ok_or_else(|| WnvError::GeometryError {
            operation: "study area".to_string(),
            message: format!("address layer '{}' has no features", addresses.name),
        })?;
        let projection = LocalProjection::centered_on(extent);
        tracing::debug!("Local projection origin: {:?}", projection.origin());

        // Buffer each breeding-ground layer
        let mut buffers = Vec::new();
        for layer_name in self.config.layers.concern.clone() {
            let started = Instant::now();
            let layer = self.store.resolve(&layer_name)?;
            let default = self.config.buffer_distance_for(&layer_name)?;
            let distance = self.inputs.buffer_distance(&layer_name, default)?;

            let buffered = buffer_layer(&layer, &distance, &projection)?;
            let out_name = format!("buff_{}", layer_name);
            self.save_zone(&out_name, &buffered)?;
            tracing::info!("Buffer created for '{}' at {}", layer_name, distance);

            self.record_step("buffer", Some(&out_name), buffered.0.len(), started);
            buffers.push(buffered);
        }

        // Overlay into the concern zone
        let started = Instant::now();
        let mode = self.config.overlay_mode()?;
        let concern_name = self
            .inputs
            .layer_name("concern zone", self.config.concern_layer_name())?;
        let concern = overlay(&buffers, mode);
        if concern.0.is_empty() {
            tracing::warn!("⚠️ The {} of the buffers is empty; no address can qualify", mode);
        }
        self.save_zone(&concern_name, &concern)?;
        let concern_area = zone_area_sq_meters(&concern, &projection);
        tracing::info!(
            "Concern zone '{}' ({}) covers {:.2} sq km",
            concern_name,
            mode,
            concern_area / 1_000_000.0
        );
        self.record_step("overlay", Some(&concern_name), concern.0.len(), started);

        // Addresses within the concern zone
        let started = Instant::now();
        let join_name = self
            .inputs
            .layer_name("address join", self.config.join_layer_name())?;
        let joined = spatial_join_within(&addresses, &concern, &join_name);
        self.store.save(&joined)?;
        let addresses_in_concern = count_where(&joined, JOIN_COUNT_FIELD, &json!(1));
        tracing::info!(
            "There are {} addresses found which fall within concerned mosquito areas.",
            addresses_in_concern
        );
        self.record_step("spatial_join", Some(&join_name), joined.len(), started);

        let show_join = self.inputs.confirm(&format!(
            "Would you like to add '{}' to the project map?",
            join_name
        ))?;
        if show_join {
            tracing::info!("'{}' will be drawn on the map", join_name);
        }

        // Opt-outs
        let avoid_name = self.config.layers.avoid_points.clone();
        let opt_outs = self.load_opt_outs().await?;

        let started = Instant::now();
        let avoid_buffer_name = format!("buff_{}", avoid_name);
        let avoid_zone = if opt_outs.is_empty() {
            MultiPolygon::new(vec![])
        } else {
            let default = self.config.buffer_distance_for(&avoid_name)?;
            let distance = self.inputs.buffer_distance(&avoid_name, default)?;
            buffer_layer(&opt_outs, &distance, &projection)?
        };
        self.save_zone(&avoid_buffer_name, &avoid_zone)?;
        self.record_step("buffer", Some(&avoid_buffer_name), avoid_zone.0.len(), started);

        // Erase opt-out areas
        let started = Instant::now();
        let spray_name = self
            .inputs
            .layer_name("spray addresses", self.config.spray_layer_name())?;
        let to_spray = erase_points(&joined, &avoid_zone, &spray_name);
        self.store.save(&to_spray)?;

        let spray_zone_name = self.config.spray_zone_layer_name().to_string();
        let spray_zone = erase_zone(&concern, &avoid_zone);
        self.save_zone(&spray_zone_name, &spray_zone)?;
        self.record_step("erase", Some(&spray_name), to_spray.len(), started);

        // Addresses to notify
        let started = Instant::now();
        let addresses_to_notify = select_by_location(&addresses, &spray_zone).len();
        tracing::info!(
            "There are {} addresses that will need treatment and must be notified.",
            addresses_to_notify
        );
        self.record_step("select_by_location", None, addresses_to_notify, started);

        // Map
        let started = Instant::now();
        let default_subtitle = self
            .options
            .subtitle
            .clone()
            .or_else(|| self.config.map.subtitle.clone());
        let subtitle = self.inputs.subtitle(default_subtitle.as_deref())?;
        let mut layout = MapLayout {
            title: self.config.map.title.clone(),
            subtitle,
            date_text: format_date(self.config.date_format())?,
            page: PageSize::from_name(self.config.page_size())?,
            layers: vec![
                MapLayer {
                    label: "Concern zone".to_string(),
                    symbol: Symbol::Fill {
                        fill: Rgb(1.0, 0.95, 0.7),
                        stroke: Rgb(0.75, 0.65, 0.2),
                    },
                    layer: zone_layer(&concern_name, &concern),
                },
                MapLayer {
                    label: "Spray zone".to_string(),
                    symbol: Symbol::Fill {
                        fill: Rgb(1.0, 0.7, 0.5),
                        stroke: Rgb(0.8, 0.3, 0.0),
                    },
                    layer: zone_layer(&spray_zone_name, &spray_zone),
                },
                MapLayer {
                    label: "Opt-out buffer".to_string(),
                    symbol: Symbol::Outline {
                        stroke: Rgb(0.1, 0.5, 0.2),
                    },
                    layer: zone_layer(&avoid_buffer_name, &avoid_zone),
                },
                MapLayer {
                    label: "Addresses to notify".to_string(),
                    symbol: Symbol::Dot {
                        color: Rgb(0.8, 0.0, 0.0),
                        radius: 1.4,
                    },
                    layer: to_spray.clone(),
                },
                MapLayer {
                    label: "Opt-out addresses".to_string(),
                    symbol: Symbol::Cross {
                        color: Rgb(0.1, 0.3, 0.8),
                        size: 2.5,
                    },
                    layer: opt_outs.clone(),
                },
            ],
            notes: vec![
                format!("Overlay: {}", mode),
                format!("Concern area: {:.2} sq km", concern_area / 1_000_000.0),
                format!("Addresses in concern areas: {}", addresses_in_concern),
                format!("Opt-out addresses: {}", opt_outs.len()),
                format!("Addresses to notify: {}", addresses_to_notify),
            ],
        };
        if show_join {
            // Under the spray points, so notified addresses stay visible
            layout.layers.insert(
                3,
                MapLayer {
                    label: join_name.clone(),
                    symbol: Symbol::Dot {
                        color: Rgb(0.55, 0.55, 0.55),
                        radius: 2.2,
                    },
                    layer: joined.clone(),
                },
            );
        }

        let output = LocalStorage::new(self.config.output_dir());
        let filename = export_map(&layout, &output, self.config.map_filename()).await?;
        let map_path = output.resolve(&filename);
        self.record_step("export_map", None, layout.layers.len(), started);

        self.monitor.log_final_stats();

        Ok(WorkflowReport {
            addresses_in_concern,
            opt_out_points: opt_outs.len(),
            addresses_to_notify,
            concern_area_sq_meters: concern_area,
            map_path,
            steps: self.steps,
        })
    }

    /// Runs the opt-out ETL when enabled, then reads the opt-out layer.
    async fn load_opt_outs(&mut self) -> Result<Layer> {
        let avoid_name = self.config.layers.avoid_points.clone();

        if self.options.skip_etl || !self.config.etl_enabled() {
            tracing::info!("ETL disabled; using existing '{}' layer", avoid_name);
        } else {
            let started = Instant::now();
            let storage = LocalStorage::new(self.config.output_dir());
            let pipeline = GSheetsEtl::new(storage, self.config.clone(), self.store.clone());
            let engine = EtlEngine::new_with_monitoring(pipeline, self.monitor.is_enabled());
            engine.run().await?;
            self.record_step("etl", Some(&avoid_name), 0, started);
        }

        match self.store.resolve(&avoid_name) {
            Ok(layer) => {
                if let Some(step) = self.steps.last_mut().filter(|s| s.name == "etl") {
                    step.feature_count = layer.len();
                }
                Ok(layer)
            }
            Err(WnvError::LayerNotFound { .. }) => {
                tracing::warn!(
                    "⚠️ Opt-out layer '{}' not found; continuing without opt-outs",
                    avoid_name
                );
                Ok(Layer::new(avoid_name, vec![]))
            }
            Err(e) => Err(e),
        }
    }
}
