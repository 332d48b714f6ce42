//! `workbg` -- interactive controller for the background worker.
//!
//! Wires the service host, event journal, download manager and permission
//! prompt together, spawns the controller task and hands stdin to the
//! console. See [`AppConfig::from_env`] for the environment variables.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workbg_app::config::{AppConfig, PermissionMode};
use workbg_app::controller::{spawn_controller, DownloadLauncher};
use workbg_app::download_manager::HttpDownloadManager;
use workbg_app::error::AppResult;
use workbg_app::permission::{ChannelPrompt, PermissionPrompt, PresetPrompt};
use workbg_core::permission::{Permission, PermissionStatus, PermissionStore};
use workbg_events::{EventBus, EventJournal};
use workbg_worker::ServiceHost;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "workbg_app=debug,workbg_worker=debug,workbg_events=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "workbg failed");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    // --- Configuration ---
    let config = AppConfig::from_env()?;
    tracing::info!(
        url = %config.download_url,
        storage_root = %config.public_storage_root.display(),
        permission = ?config.storage_permission,
        "Loaded configuration"
    );

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let journal = Arc::new(EventJournal::default());
    let journal_handle = {
        let journal = Arc::clone(&journal);
        let receiver = event_bus.subscribe();
        tokio::spawn(async move { journal.run(receiver).await })
    };

    // --- Service host ---
    let host = ServiceHost::new(config.host_config(), Arc::clone(&event_bus));

    // --- Downloads ---
    let downloads = Arc::new(HttpDownloadManager::new(
        config.public_storage_root.clone(),
        config.network,
        Arc::clone(&event_bus),
    )?);

    let (prompt, prompts, permissions) = match config.storage_permission {
        PermissionMode::Prompt => {
            let (prompt, rx) = ChannelPrompt::new();
            let prompt: Arc<dyn PermissionPrompt> = Arc::new(prompt);
            (prompt, Some(rx), PermissionStore::new())
        }
        PermissionMode::Granted => {
            let prompt: Arc<dyn PermissionPrompt> =
                Arc::new(PresetPrompt::new(PermissionStatus::Granted));
            (
                prompt,
                None,
                PermissionStore::with_granted([Permission::WriteStorage]),
            )
        }
        PermissionMode::Denied => {
            let prompt: Arc<dyn PermissionPrompt> =
                Arc::new(PresetPrompt::new(PermissionStatus::Denied));
            (prompt, None, PermissionStore::new())
        }
    };

    let launcher = DownloadLauncher::new(
        downloads.clone(),
        prompt,
        permissions,
        config.download_target(),
        Arc::clone(&event_bus),
    );

    // --- Controller ---
    let cancel = CancellationToken::new();
    let (controller, controller_task) = spawn_controller(
        host.clone(),
        launcher,
        Arc::clone(&event_bus),
        config.controller_settings(),
        cancel.clone(),
    );
    tracing::info!("Controller started");

    let console_result = workbg_app::console::run(&controller, &host, &journal, prompts).await;

    // --- Shutdown ---
    controller.teardown().await?;
    cancel.cancel();
    drop(controller);
    match tokio::time::timeout(Duration::from_secs(5), controller_task).await {
        Ok(Ok(())) => tracing::info!("Controller stopped"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Controller task failed"),
        Err(_) => tracing::warn!("Controller did not stop within 5s"),
    }

    host.shutdown();
    downloads.shutdown(config.download_shutdown_grace).await;

    journal_handle.abort();
    tracing::info!("Shutdown complete");

    console_result
}
