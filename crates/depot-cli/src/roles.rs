//! The three process roles of the binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use depot_core::app::{CleanupJob, Supervisor, uploads};
use depot_core::config::{AppConfig, load_schedule};
use depot_core::error::ConfigError;
use depot_core::impls::{DocumentDirStore, LocalFileSystem, ProcessLauncher, SubprocessAction};
use depot_core::ports::{JobAction, SystemClock};
use depot_core::schedule::JobCatalog;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{info, warn};

/// Jobs a schedule file may name.
pub const CLEAN_UP: &str = "clean_up";
const JOBS: &[&str] = &[CLEAN_UP];

/// Coordinator: schedule jobs and keep the workers running until a
/// shutdown signal.
pub async fn serve(config: AppConfig, forwarded: Vec<OsString>) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;

    // fail fast when the shared store is unusable
    let store = DocumentDirStore::open(config.db_path()).await?;
    info!(dir = %store.dir().display(), "document store ready");

    let descriptors = load_schedule(&config.schedule_path())?;
    let mut catalog = JobCatalog::new();
    for &name in JOBS {
        let action = SubprocessAction::new(&exe, with_command(&forwarded, ["run-job", name]));
        catalog = catalog.with_job(name, Arc::new(action));
    }
    let scheduler = Arc::new(catalog.build_scheduler(&descriptors)?);
    scheduler.start_all();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock = tokio::spawn(Arc::clone(&scheduler).run(SystemClock, shutdown_rx.clone()));

    info!(workers = config.workers, "try to run worker instances");
    let launcher = ProcessLauncher::new(exe, with_command(&forwarded, ["worker"]));
    let mut supervisor = Supervisor::new(launcher, config.workers)?;
    supervisor.start().await?;
    info!(pid = std::process::id(), "coordinator started");

    let supervising = tokio::spawn(supervisor.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    if let Err(e) = supervising.await {
        warn!(error = %e, "supervisor task failed");
    }
    if let Err(e) = clock.await {
        warn!(error = %e, "scheduler task failed");
    }
    info!("coordinator stopped");
    Ok(())
}

fn with_command<const N: usize>(forwarded: &[OsString], command: [&str; N]) -> Vec<OsString> {
    let mut args = forwarded.to_vec();
    args.extend(command.into_iter().map(OsString::from));
    args
}

/// Worker: host the upload record operations until told to stop.
pub async fn worker(config: AppConfig, index: usize) -> anyhow::Result<()> {
    let store = DocumentDirStore::open(config.db_path()).await?;
    let upload_dir = config.upload_path();
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .with_context(|| format!("cannot create upload dir {}", upload_dir.display()))?;

    let policy = config.upload_policy();
    let first_page = uploads::list_page(&store, 1, config.per_page).await?;
    info!(
        worker_index = index,
        pid = std::process::id(),
        upload_dir = %upload_dir.display(),
        max_bytes = policy.max_bytes,
        listed = first_page.len(),
        "worker started"
    );

    tokio::select! {
        _ = supervisor_gone() => info!(worker_index = index, "stop requested by coordinator"),
        _ = shutdown_signal() => {}
    }
    info!(worker_index = index, "worker stopped");
    Ok(())
}

/// Resolves when stdin reaches EOF. The coordinator holds the other end.
async fn supervisor_gone() {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 256];
    loop {
        match stdin.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => continue,
        }
    }
}

/// Run one job in this process.
pub async fn run_job(config: AppConfig, name: &str) -> anyhow::Result<()> {
    let store = Arc::new(DocumentDirStore::open(config.db_path()).await?);
    let root: PathBuf = config.root_dir.clone();
    let catalog = JobCatalog::new().with_job(
        CLEAN_UP,
        Arc::new(CleanupJob::new(store, Arc::new(LocalFileSystem), root)),
    );
    let action = catalog
        .get(name)
        .ok_or_else(|| ConfigError::UnknownJob(name.to_string()))?;

    info!(job = %name, "job started");
    action.run().await?;
    info!(job = %name, "job finished");
    Ok(())
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
