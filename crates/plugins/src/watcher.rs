//! Plug-in directory hot-reload (§4.12).
//!
//! Watches the plug-ins directory; per-plug-in debounce (default 150ms);
//! on fire, reloads the module with cache invalidation, calls
//! `remove_plugin` then re-registers its capabilities. If the directory
//! vanished, just removes. In-flight reloads for the same plug-in are
//! de-duplicated (single-flight).
//!
//! Grounded on the admin auth config watcher's `notify` + debounce-drain
//! loop (`crates/server/src/auth/watcher.rs` in the teacher repo), widened
//! from one fixed file to a directory of independently-debounced entries.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::PluginError;
use crate::registry::PluginRegistry;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Loads (or reloads) a plug-in module directory and registers its
/// capabilities into the registry. The reference implementation has no
/// dynamic-library loader; a real deployment supplies one satisfying this
/// trait (e.g. backed by `wasmtime` or a subprocess protocol) — loading
/// mechanics are explicitly out of scope for this crate (§4.12 leaves
/// "module" loading as an extension point, mirroring the provider
/// descriptor note: "Out of scope beyond the interface shape").
#[async_trait]
pub trait PluginLoader: Send + Sync {
    async fn load(&self, plugin_name: &str, path: &Path, registry: &PluginRegistry) -> Result<(), PluginError>;
}

struct PluginSlot {
    debounce_timer: Option<tokio::task::JoinHandle<()>>,
    reloading: bool,
    reload_again: bool,
}

impl Default for PluginSlot {
    fn default() -> Self {
        Self {
            debounce_timer: None,
            reloading: false,
            reload_again: false,
        }
    }
}

/// Watches `plugins_path` and keeps `registry` in sync with what's on
/// disk, one subdirectory per plug-in.
pub struct PluginWatcher {
    plugins_path: PathBuf,
    registry: Arc<PluginRegistry>,
    loader: Arc<dyn PluginLoader>,
    debounce: Duration,
    slots: Arc<Mutex<HashMap<String, PluginSlot>>>,
}

impl PluginWatcher {
    pub fn new(plugins_path: impl Into<PathBuf>, registry: Arc<PluginRegistry>, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            plugins_path: plugins_path.into(),
            registry,
            loader,
            debounce: DEFAULT_DEBOUNCE,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!(error = %e, "plug-in watcher exited with error");
            }
        })
    }

    async fn run(self: &Arc<Self>) -> Result<(), PluginError> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<OsString>(64);

        let watch_dir = self.plugins_path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if !is_relevant_event(event.kind) {
                        return;
                    }
                    for path in &event.paths {
                        if let Some(plugin_name) = plugin_name_for_path(&watch_dir, path) {
                            let _ = tx.try_send(plugin_name);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "plug-in directory watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.plugins_path, RecursiveMode::Recursive)?;
        info!(path = %self.plugins_path.display(), "plug-in watcher started");

        while let Some(plugin_name) = rx.recv().await {
            self.clone().on_change(plugin_name).await;
        }

        Ok(())
    }

    async fn on_change(self: Arc<Self>, plugin_name: OsString) {
        let plugin_name = plugin_name.to_string_lossy().into_owned();
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(plugin_name.clone()).or_default();

        if slot.reloading {
            slot.reload_again = true;
            debug!(plugin_name, "change arrived mid-reload, queuing follow-up reload");
            return;
        }

        if let Some(handle) = slot.debounce_timer.take() {
            handle.abort();
        }

        let this = self.clone();
        let debounce = self.debounce;
        let name_for_timer = plugin_name.clone();
        slot.debounce_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            this.fire_reload(name_for_timer).await;
        }));
    }

    async fn fire_reload(self: Arc<Self>, plugin_name: String) {
        {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(plugin_name.clone()).or_default();
            slot.reloading = true;
            slot.debounce_timer = None;
        }

        let plugin_dir = self.plugins_path.join(&plugin_name);
        self.registry.remove_plugin(&plugin_name);

        if plugin_dir.exists() {
            match self.loader.load(&plugin_name, &plugin_dir, &self.registry).await {
                Ok(()) => info!(plugin_name, "plug-in reloaded"),
                Err(e) => error!(plugin_name, error = %e, "plug-in reload failed"),
            }
        } else {
            info!(plugin_name, "plug-in directory removed, capabilities dropped");
        }

        let reload_again = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(plugin_name.clone()).or_default();
            slot.reloading = false;
            std::mem::take(&mut slot.reload_again)
        };

        if reload_again {
            Box::pin(self.fire_reload(plugin_name)).await;
        }
    }
}

fn is_relevant_event(kind: EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// The immediate child directory name of `watch_dir` that `path` falls
/// under, i.e. the plug-in name.
fn plugin_name_for_path(watch_dir: &Path, path: &Path) -> Option<OsString> {
    let relative = path.strip_prefix(watch_dir).ok()?;
    relative.components().next().map(|c| c.as_os_str().to_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_events_cover_create_modify_remove() {
        assert!(is_relevant_event(EventKind::Create(notify::event::CreateKind::File)));
        assert!(is_relevant_event(EventKind::Modify(notify::event::ModifyKind::Data(
            notify::event::DataChange::Content
        ))));
        assert!(is_relevant_event(EventKind::Remove(notify::event::RemoveKind::File)));
        assert!(!is_relevant_event(EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[test]
    fn plugin_name_is_first_path_component_under_watch_dir() {
        let watch_dir = Path::new("/plugins");
        let path = Path::new("/plugins/webhook/index.js");
        assert_eq!(plugin_name_for_path(watch_dir, path), Some(OsString::from("webhook")));
    }

    #[test]
    fn path_outside_watch_dir_has_no_plugin_name() {
        let watch_dir = Path::new("/plugins");
        let path = Path::new("/elsewhere/file.js");
        assert_eq!(plugin_name_for_path(watch_dir, path), None);
    }
}
