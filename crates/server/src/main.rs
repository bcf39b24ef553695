use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use latchflow_plugins::{PluginError, PluginLoader, PluginRegistry, PluginWatcher};
use latchflow_runtime::ActionConsumer;
use latchflow_server::runtime_adapters::StoreActionDefinitions;
use latchflow_server::{AppState, Config};

/// Latchflow standalone HTTP server (§4.16-§4.18).
#[derive(Parser, Debug)]
#[command(name = "latchflow-server", about = "Multi-tenant bundle distribution and automation backend")]
struct Cli {
    /// Override the bind port (otherwise read from `PORT`, §6).
    #[arg(long)]
    port: Option<u16>,
}

/// No in-tree dynamic loader exists (§4.12 leaves "module" loading as an
/// extension point); this one logs what it would have loaded and leaves
/// the registry untouched, so the watcher still exercises debounce and
/// directory-diffing end to end.
struct NoopPluginLoader;

#[async_trait::async_trait]
impl PluginLoader for NoopPluginLoader {
    async fn load(&self, plugin_name: &str, path: &std::path::Path, _registry: &PluginRegistry) -> Result<(), PluginError> {
        info!(plugin = plugin_name, path = %path.display(), "plug-in directory changed (no loader configured, skipping)");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let state = AppState::new(config);

    // Drive the action queue: one consumer per process, fed by whatever
    // `WorkQueue` the state was built with (§4.13/§4.15).
    let consumer = ActionConsumer::new(
        Arc::new(StoreActionDefinitions::new(Arc::clone(&state.store))),
        Arc::clone(&state.invocations) as Arc<dyn latchflow_runtime::InvocationRecorder>,
        Arc::clone(&state.plugins),
        state.master_key.clone(),
    );
    let queue_for_consumer = Arc::clone(&state.queue);
    tokio::spawn(async move {
        if let Err(e) = queue_for_consumer.consume_actions(Arc::new(consumer)).await {
            error!(error = %e, "action queue consumer exited with error");
        }
    });

    // Watch the plug-in directory for hot-reload if it exists (§4.12).
    let plugins_path = state.config.plugins_path.clone();
    if Path::new(&plugins_path).is_dir() {
        let watcher = Arc::new(PluginWatcher::new(
            plugins_path.clone(),
            Arc::clone(&state.plugins),
            Arc::new(NoopPluginLoader),
        ));
        watcher.spawn();
        info!(path = %plugins_path, "watching plug-in directory");
    } else {
        warn!(path = %plugins_path, "plug-in directory does not exist, skipping hot-reload watcher");
    }

    let port = state.config.port;
    let app = latchflow_server::build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "latchflow-server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("latchflow-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
