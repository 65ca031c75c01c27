use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::diagnostics::{HealthReport, health_report};
use crate::indexer::{RebuildOptions, RebuildSummary, build_index};
use crate::store::IndexStore;
use crate::watch::WatchLoop;
use crate::{Error, GraphView, NoteRecord, Result, Vault, VaultIndex, VaultPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WatchKind {
    Create,
    Modify,
    ModifyData,
    Remove,
    Rename,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReindexCause {
    /// The user (or host application) explicitly requested an index rebuild.
    Manual,
    /// An indexing pass done as part of service startup.
    InitialBuild,
    /// Filesystem watch events triggered the rebuild; `kind` is the strongest
    /// kind seen during the debounce window.
    Watch {
        kind: WatchKind,
        paths: BTreeSet<VaultPath>,
    },
}

#[derive(Debug, Clone)]
pub enum VaultEvent {
    Rebuilt {
        cause: ReindexCause,
        summary: RebuildSummary,
    },
    RebuildFailed {
        cause: ReindexCause,
        error: String,
    },
    Error {
        path: Option<VaultPath>,
        error: String,
    },
}

/// State shared between the service handle and its watch task.
struct Engine {
    vault: Vault,
    store: IndexStore,
    current: RwLock<Option<Arc<VaultIndex>>>,
    rebuild_lock: Mutex<()>,
    events: broadcast::Sender<VaultEvent>,
}

impl Engine {
    fn snapshot(&self) -> Option<Arc<VaultIndex>> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    fn publish(&self, index: Arc<VaultIndex>) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(index);
    }

    async fn read_store(&self) -> Result<VaultIndex> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| Error::Task(format!("index load task failed: {e}")))?
    }

    async fn load(&self) -> Result<Arc<VaultIndex>> {
        let index = Arc::new(self.read_store().await?);
        debug!(notes = index.len(), path = %self.store.path().display(), "index loaded");
        self.publish(Arc::clone(&index));
        Ok(index)
    }

    async fn rebuild(&self, options: RebuildOptions, cause: ReindexCause) -> Result<RebuildSummary> {
        let _guard = self.rebuild_lock.lock().await;
        info!(?cause, full = options.force_full, "rebuild started");

        let previous = match self.snapshot() {
            Some(idx) => Some(idx),
            None => match self.read_store().await {
                Ok(idx) => Some(Arc::new(idx)),
                Err(err) => {
                    debug!(error = %err, "no usable previous snapshot; extracting everything");
                    None
                }
            },
        };

        match self.rebuild_from(previous.as_deref(), &options).await {
            Ok(summary) => {
                info!(
                    notes = summary.total_notes,
                    connections = summary.total_connections,
                    extracted = summary.extracted,
                    reused = summary.reused,
                    "rebuild finished"
                );
                let _ = self.events.send(VaultEvent::Rebuilt {
                    cause,
                    summary: summary.clone(),
                });
                Ok(summary)
            }
            Err(err) => {
                warn!(error = %err, "rebuild failed; previous snapshot kept");
                let _ = self.events.send(VaultEvent::RebuildFailed {
                    cause,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn rebuild_from(
        &self,
        previous: Option<&VaultIndex>,
        options: &RebuildOptions,
    ) -> Result<RebuildSummary> {
        let (index, summary) = build_index(&self.vault, previous, options).await?;

        let index = Arc::new(index);
        let store = self.store.clone();
        let to_save = Arc::clone(&index);
        tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .map_err(|e| Error::Task(format!("index save task failed: {e}")))??;

        // Only a snapshot that reached disk becomes visible to readers.
        self.publish(index);
        Ok(summary)
    }
}

/// Explicit handle over one vault's index; every consumer holds one of these.
pub struct VaultService {
    engine: Arc<Engine>,
    shutdown_tx: watch::Sender<bool>,
    watch_task: Option<tokio::task::JoinHandle<()>>,
}

impl VaultService {
    pub fn new(vault: Vault) -> Self {
        let (events, _) = broadcast::channel(512);
        let (shutdown_tx, _) = watch::channel(false);
        let store = IndexStore::for_vault(&vault);
        Self {
            engine: Arc::new(Engine {
                vault,
                store,
                current: RwLock::new(None),
                rebuild_lock: Mutex::new(()),
                events,
            }),
            shutdown_tx,
            watch_task: None,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.engine.vault
    }

    pub fn store(&self) -> &IndexStore {
        &self.engine.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.engine.events.subscribe()
    }

    /// The snapshot currently held in memory, if any was loaded or built.
    pub fn snapshot(&self) -> Option<Arc<VaultIndex>> {
        self.engine.snapshot()
    }

    /// Reads the on-disk snapshot and makes it current.
    ///
    /// Fails with `IndexMissing`/`IndexCorrupt` instead of returning an empty index.
    pub async fn load_index(&self) -> Result<Arc<VaultIndex>> {
        self.engine.load().await
    }

    /// In-memory snapshot, loading it from disk on first use.
    pub async fn index(&self) -> Result<Arc<VaultIndex>> {
        match self.snapshot() {
            Some(idx) => Ok(idx),
            None => self.load_index().await,
        }
    }

    pub async fn rebuild(&self, force_full: bool) -> Result<RebuildSummary> {
        let options = if force_full {
            RebuildOptions::full()
        } else {
            RebuildOptions::default()
        };
        self.rebuild_with(options, ReindexCause::Manual).await
    }

    /// Rebuilds and atomically replaces the snapshot on disk and in memory.
    ///
    /// On failure neither copy changes.
    pub async fn rebuild_with(
        &self,
        options: RebuildOptions,
        cause: ReindexCause,
    ) -> Result<RebuildSummary> {
        self.engine.rebuild(options, cause).await
    }

    pub async fn get_note(&self, slug: &str) -> Result<Option<NoteRecord>> {
        let index = self.index().await?;
        Ok(index.note(slug).cloned())
    }

    pub async fn graph_view(&self, max_nodes: usize) -> Result<GraphView> {
        let index = self.index().await?;
        Ok(index.graph_view(max_nodes, self.vault().config().graph_degree_cap))
    }

    pub async fn health_report(&self) -> Result<HealthReport> {
        let index = self.index().await?;
        let vault = self.vault().clone();
        tokio::task::spawn_blocking(move || health_report(&index, &vault))
            .await
            .map_err(|e| Error::Task(format!("health report task failed: {e}")))
    }

    /// Starts the background watch loop. Calling it twice is a no-op.
    pub async fn start_watching(&mut self) -> Result<()> {
        if self.watch_task.is_some() {
            return Ok(());
        }
        let _ = self.shutdown_tx.send(false);

        let (raw_tx, raw_rx) =
            mpsc::unbounded_channel::<std::result::Result<notify::Event, notify::Error>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(self.vault().root(), RecursiveMode::Recursive)?;
        info!(root = %self.vault().root().display(), "watching vault");

        let watch_loop = WatchLoop {
            vault: self.vault().clone(),
            events: self.engine.events.clone(),
            watcher: Some(watcher),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        let engine = Arc::clone(&self.engine);
        self.watch_task = Some(tokio::spawn(watch_loop.run(
            raw_rx,
            shutdown_rx,
            move |cause| {
                let engine = Arc::clone(&engine);
                async move {
                    let options = match &cause {
                        ReindexCause::Watch { paths, .. } => {
                            RebuildOptions::incremental(paths.clone())
                        }
                        _ => RebuildOptions::default(),
                    };
                    engine.rebuild(options, cause).await
                }
            },
        )));

        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watch_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.watch_task.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for VaultService {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VaultConfig;

    fn service_with(files: &[(&str, &str)]) -> (tempfile::TempDir, VaultService) {
        let dir = tempfile::tempdir().unwrap();
        for (rel, body) in files {
            let p = dir.path().join(rel);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, body).unwrap();
        }
        let vault = Vault::with_config(dir.path(), VaultConfig::default()).unwrap();
        (dir, VaultService::new(vault))
    }

    #[tokio::test]
    async fn reads_before_any_build_report_missing_index() {
        let (_dir, svc) = service_with(&[("a.tex", "% title: A\n")]);
        assert!(svc.snapshot().is_none());
        let err = svc.get_note("a").await.unwrap_err();
        assert!(matches!(err, Error::IndexMissing(_)));
    }

    #[tokio::test]
    async fn rebuild_publishes_snapshot_and_event() {
        let (_dir, svc) = service_with(&[
            ("a.tex", "% title: A\n\\notelink{B}\n"),
            ("b.tex", "% title: B\n"),
        ]);
        let mut events = svc.subscribe();

        let summary = svc.rebuild(false).await.unwrap();
        assert_eq!(summary.total_connections, 1);
        assert!(svc.store().exists());

        let note = svc.get_note("b").await.unwrap().unwrap();
        assert!(note.backlinks.contains("a"));
        assert!(svc.get_note("nope").await.unwrap().is_none());

        match events.recv().await.unwrap() {
            VaultEvent::Rebuilt { cause, summary } => {
                assert_eq!(cause, ReindexCause::Manual);
                assert_eq!(summary.total_notes, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn snapshots_held_by_readers_survive_rebuilds() {
        let (dir, svc) = service_with(&[("a.tex", "% title: A\n")]);
        svc.rebuild(false).await.unwrap();
        let before = svc.snapshot().unwrap();

        std::fs::write(dir.path().join("b.tex"), "% title: B\n").unwrap();
        svc.rebuild(false).await.unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(svc.snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn fresh_service_loads_what_another_one_saved() {
        let (dir, svc) = service_with(&[("a.tex", "% title: A\n\\notelink{ghost}\n")]);
        svc.rebuild(true).await.unwrap();

        let other = VaultService::new(Vault::open(dir.path()).unwrap());
        let loaded = other.load_index().await.unwrap();
        assert!(loaded.same_content(&svc.snapshot().unwrap()));
        assert_eq!(other.graph_view(0).await.unwrap().nodes.len(), 1);
    }
}
