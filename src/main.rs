use clap::Parser;
use std::io;
use wnv_outbreak::app::inputs::{AnalysisInputs, ConfiguredInputs, PromptInputs};
use wnv_outbreak::app::workflow::describe_plan;
use wnv_outbreak::utils::{logger, validation::Validate};
use wnv_outbreak::{CliConfig, OutbreakWorkflow, WnvConfig, WnvError, WorkflowOptions, WorkflowReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    // The log directory lives in the config, so read it before the logger exists.
    let loaded = WnvConfig::from_file(&args.config);
    let log_dir = loaded.as_ref().ok().and_then(|c| c.log_dir());
    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose, log_dir.as_deref());
    }

    tracing::info!("Starting wnv-outbreak");
    tracing::debug!("CLI args: {:?}", args);

    let config = match loaded.and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration error ({}): {}", args.config, e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    tracing::info!("✅ Configuration loaded and validated successfully");

    let options = WorkflowOptions {
        skip_etl: args.skip_etl,
        subtitle: args.subtitle.clone(),
        monitor: args.monitor,
    };

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        match describe_plan(&config, &options) {
            Ok(plan) => {
                println!("🔍 Planned steps:");
                for (i, step) in plan.iter().enumerate() {
                    println!("  {}. {}", i + 1, step);
                }
                return Ok(());
            }
            Err(e) => exit_with(e),
        }
    }

    if options.monitor || config.monitoring_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let result = if args.interactive {
        let valid_units = match config.valid_units() {
            Ok(units) => units,
            Err(e) => exit_with(e),
        };
        // Prompts read stdin synchronously on the main task; nothing else runs meanwhile.
        let stdin = io::stdin();
        let inputs = PromptInputs::new(stdin.lock(), io::stdout(), valid_units);
        run_workflow(config, inputs, options).await
    } else {
        run_workflow(config, ConfiguredInputs, options).await
    };

    match result {
        Ok(report) => print_report(&report),
        Err(e) => exit_with(e),
    }

    Ok(())
}

async fn run_workflow<I: AnalysisInputs>(
    config: WnvConfig,
    inputs: I,
    options: WorkflowOptions,
) -> wnv_outbreak::Result<WorkflowReport> {
    OutbreakWorkflow::new(config, inputs, options).run().await
}

fn exit_with(e: WnvError) -> ! {
    tracing::error!(
        "❌ Workflow failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    std::process::exit(e.severity().exit_code());
}

fn display_config_summary(config: &WnvConfig, args: &CliConfig) {
    println!("📋 Configuration Summary:");
    println!("  Project: {}", config.project.name);
    println!("  Concern layers: {}", config.layers.concern.join(", "));
    println!("  Addresses: {}", config.layers.addresses);
    println!("  Workspace: {}", config.workspace_dir().display());
    println!("  Output: {}", config.output_dir().display());
    println!("  Opt-out ETL: {}", config.etl_enabled() && !args.skip_etl);
    if args.interactive {
        println!("  🖐 Interactive mode");
    }
    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }
    println!();
}

fn print_report(report: &WorkflowReport) {
    println!("✅ Workflow completed successfully!");
    println!(
        "  Addresses in concern areas: {}",
        report.addresses_in_concern
    );
    println!("  Opt-out addresses: {}", report.opt_out_points);
    println!("  Addresses to notify: {}", report.addresses_to_notify);
    println!(
        "  Concern area: {:.2} sq km",
        report.concern_area_sq_meters / 1_000_000.0
    );
    println!("📁 Map saved to: {}", report.map_path.display());
    println!("⏱ Total duration: {:?}", report.total_duration());

    for step in &report.steps {
        println!(
            "  - {:<20} {:>6} features  {:?}{}",
            step.name,
            step.feature_count,
            step.duration,
            step.output_layer
                .as_deref()
                .map(|l| format!("  -> {}", l))
                .unwrap_or_default()
        );
    }
}
