use std::process;
use std::sync::Arc;

use chrono::Local;
use dotenv::dotenv;
use record_loader_lib::{
    cli::parse_args,
    commands::{exit_code, run_loader, EXIT_FAILURE, EXIT_USAGE},
    config::LoaderConfig,
    engine::MemoryEngine,
    logging::{format_error_report, init_logging},
    pipeline::{listen_for_shutdown_signals, ShutdownToken},
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let args = parse_args();
    let config = match LoaderConfig::from_cli(&args, Local::now()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(EXIT_USAGE);
        }
    };

    if let Some(dir) = config.outputs.errors.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("failed to create output directory {}: {err}", dir.display());
            process::exit(EXIT_FAILURE);
        }
    }
    let logging_context = match init_logging(
        "record_loader",
        "load",
        config.effective_log_level(),
        Some(&config.outputs.errors),
    ) {
        Ok(context) => context,
        Err(err) => {
            eprintln!(
                "failed to create error log {}: {err}",
                config.outputs.errors.display()
            );
            process::exit(EXIT_FAILURE);
        }
    };
    let run_span = tracing::info_span!(
        "loader_run",
        service = %logging_context.service,
        environment = %logging_context.environment,
        mode = %logging_context.mode,
        run_id = %logging_context.run_id
    );
    let _run_guard = run_span.enter();
    info!(
        event = "loader_starting",
        input = %config.input.display(),
        with_info = config.with_info,
        requested_workers = config.requested_workers,
        "starting record loader"
    );

    let engine = match MemoryEngine::from_config_json(
        &config.engine_config_json,
        config.debug_trace,
    ) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!(
                event = "engine_init_failed",
                error_report = %format_error_report(&err),
                "failed to initialize engine"
            );
            process::exit(EXIT_FAILURE);
        }
    };

    let shutdown = ShutdownToken::new();
    let signal_listener = tokio::spawn(listen_for_shutdown_signals(shutdown.clone()));

    let result = run_loader(&config, engine, shutdown.clone()).await;

    // Lets the listener task return.
    shutdown.signal_shutdown();
    match signal_listener.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(
            event = "signal_listener_failed",
            error = %err,
            "signal listener failed"
        ),
        Err(err) => warn!(
            event = "signal_listener_failed",
            error = %err,
            "signal listener panicked"
        ),
    }

    match result {
        Ok(summary) => {
            let code = exit_code(&summary);
            info!(
                event = "loader_finished",
                outcome = ?summary.outcome,
                exit_code = code,
                "record loader finished"
            );
            process::exit(code);
        }
        Err(err) => {
            error!(
                event = "loader_failed",
                error_report = %format_error_report(&err),
                "record loader failed"
            );
            process::exit(EXIT_FAILURE);
        }
    }
}
