mod cli;

use std::process;
use std::sync::Arc;

use clap::Parser;
use footage_engine::{
    AlertSource, ApiClient, DeviceDirectory, DownloadEngine, EngineError, Scheduler, TaskWindow,
    derive_tasks, manual_tasks,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        error!(error = %e, "run failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> Result<(), EngineError> {
    let config = args.engine_config();
    let api = ApiClient::new(&config)?;

    // Built once per run; read-only afterwards. A failed fetch degrades to an
    // empty table: in alert mode the table only supplies companion-audio
    // lookups, and in manual mode an empty table means nothing to do.
    let mapping = match DeviceDirectory::new(api.clone())
        .resolve(args.location_uuid.as_deref(), args.camera_uuid.as_deref())
        .await
    {
        Ok(mapping) => mapping,
        Err(e) => {
            warn!(error = %e, "device directory unavailable, continuing without it");
            std::collections::HashMap::new()
        }
    };

    let tasks = if args.alerts {
        info!("running in alerts mode, fetching policy alerts");
        let alerts = AlertSource::new(api.clone())
            .fetch_alerts(
                args.max_alerts,
                args.location_uuid.as_deref(),
                args.camera_uuid.as_deref(),
                args.before_time.map(|t| t * 1000),
                args.after_time.map(|t| t * 1000),
            )
            .await;
        if alerts.is_empty() {
            warn!("no policy alerts found matching criteria");
            return Ok(());
        }

        let tasks = derive_tasks(&alerts, args.alert_buffer);
        if tasks.is_empty() {
            warn!("no valid download tasks generated from alerts");
            return Ok(());
        }
        tasks
    } else {
        if mapping.is_empty() {
            warn!("no eligible devices found matching criteria");
            return Ok(());
        }
        info!("running in manual mode, downloading footage for the specified time range");
        manual_tasks(
            &mapping,
            TaskWindow {
                start_time: args.effective_start_time(),
                duration: args.duration,
            },
        )
    };

    info!(tasks = tasks.len(), "starting downloads");
    let engine = Arc::new(DownloadEngine::from_config(&config, api));
    let scheduler = Scheduler::new(engine, &config);
    let outcomes = scheduler.run_all(tasks, Arc::new(mapping)).await;

    // Exit status reflects that work was attempted; per-task failures were
    // already reported and must not fail the whole run.
    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        total = outcomes.len(),
        succeeded = outcomes.len() - failed,
        failed,
        "done"
    );
    Ok(())
}
