pub mod toml_config;

pub use toml_config::WnvConfig;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "wnv-outbreak")]
#[command(about = "Plan West Nile virus spray zones and export the notification map")]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "wnv.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Log CPU and memory usage after each step
    #[arg(long)]
    pub monitor: bool,

    /// Prompt for buffer distances, layer names and the map subtitle
    #[arg(short, long)]
    pub interactive: bool,

    /// Subtitle appended under the map title
    #[arg(long)]
    pub subtitle: Option<String>,

    /// Use the existing opt-out layer instead of fetching the spreadsheet
    #[arg(long)]
    pub skip_etl: bool,

    /// Validate the configuration and print the plan without processing
    #[arg(long)]
    pub dry_run: bool,

    /// Emit JSON log lines instead of the compact format
    #[arg(long)]
    pub log_json: bool,
}
