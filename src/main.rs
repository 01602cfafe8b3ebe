use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use driver_monitor::config::Config;
use driver_monitor::logging::init_tracing;
use driver_monitor::{Monitor, ReplaySource};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config);
    tracing::info!(
        notify = config.notify_mode.as_str(),
        sessions = %config.session_dir.display(),
        "configuration loaded"
    );

    let Some(frames) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: driver-monitor <frames.jsonl>");
        return ExitCode::from(2);
    };

    let source = match ReplaySource::open(&frames).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!(error = %e, "cannot open pose source");
            return ExitCode::FAILURE;
        }
    };

    let mut monitor = Monitor::from_config(&config);
    if let Err(e) = monitor.start(Arc::new(source)) {
        tracing::error!(error = %e, "failed to start monitoring");
        return ExitCode::FAILURE;
    }

    tokio::select! {
        _ = monitor.source_ended() => {},
        _ = shutdown_signal() => tracing::info!("interrupted"),
    }

    if let Ok(snapshot) = monitor.snapshot() {
        tracing::info!(status = %snapshot.headline(), alarm = %snapshot.alarm.state, "final state");
    }

    match monitor.stop().await {
        Ok(handle) => {
            println!("{}", handle.summary_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to save session");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
