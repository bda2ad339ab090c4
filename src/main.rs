use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use predictflow::cli::{apply_overrides, format_dry_run, Args};
use predictflow::config::{load_config_file, ServiceConfig};
use predictflow::logging::init_logging;
use predictflow::pipeline::Orchestrator;
use predictflow::server::{create_router, AppState};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load .env file if specified
    if let Some(ref env_file) = args.env_file {
        if let Err(e) = dotenvy::from_path(env_file) {
            eprintln!("Failed to load env file {}: {}", env_file.display(), e);
            process::exit(1);
        }
    }

    let config = match args.config_file {
        Some(ref path) => match load_config_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => ServiceConfig::default(),
    };

    let config = match apply_overrides(config, &args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    // Dry-run mode: print pipeline info and exit
    if args.dry_run {
        println!("{}", format_dry_run(&config, &args));
        return;
    }

    // Initialize logging
    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let _logging = match init_logging(filter, config.logging.file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            process::exit(1);
        }
    };

    let orchestrator = match Orchestrator::from_config(&config) {
        Ok(orchestrator) => Arc::new(orchestrator),
        Err(e) => {
            error!("Failed to build pipeline: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = orchestrator.start() {
        error!("Failed to start pipeline: {}", e);
        process::exit(1);
    }

    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    info!("Starting predictflow on {}", addr);

    let state = AppState::new(Arc::clone(&orchestrator), config.pipeline.output_path.clone());
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            orchestrator.stop().await;
            process::exit(1);
        }
    };

    info!("Server listening on {}", addr);
    info!("Endpoints:");
    info!("  GET  /predict - Enqueue a prediction request");
    info!("  GET  /score   - Last model score");
    info!("  GET  /health  - Health check");
    info!("  GET  /status  - Pipeline lifecycle and counters");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let report = orchestrator.stop().await;
    if !report.is_clean() {
        warn!("Unresponsive stages at shutdown: {:?}", report.unresponsive);
    }

    if let Err(e) = served {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
