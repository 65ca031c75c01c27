use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{RebuildSummary, ReindexCause, Result, Vault, VaultEvent, VaultPath, WatchKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    PendingRebuild,
    Rebuilding,
}

/// Coalesces bursts of change events into single rebuilds.
///
/// Every change (re)arms the deadline. When the deadline passes in
/// `PendingRebuild` with no rebuild in flight, a rebuild starts. Changes seen
/// while rebuilding move the state back to `PendingRebuild`; the deadline is
/// re-armed once the running rebuild finishes, so two rebuilds never overlap.
#[derive(Debug, Clone)]
pub struct Debouncer {
    state: WatchState,
    delay: Duration,
    deadline: Option<Instant>,
    in_flight: bool,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: WatchState::Idle,
            delay,
            deadline: None,
            in_flight: false,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_change(&mut self, now: Instant) {
        self.state = WatchState::PendingRebuild;
        self.deadline = Some(now + self.delay);
    }

    /// Returns true when a rebuild should start now.
    pub fn on_deadline(&mut self) -> bool {
        self.deadline = None;
        if self.state != WatchState::PendingRebuild || self.in_flight {
            return false;
        }
        self.state = WatchState::Rebuilding;
        self.in_flight = true;
        true
    }

    pub fn on_rebuild_finished(&mut self, now: Instant) {
        self.in_flight = false;
        match self.state {
            WatchState::Rebuilding => self.state = WatchState::Idle,
            WatchState::PendingRebuild if self.deadline.is_none() => {
                self.deadline = Some(now + self.delay);
            }
            _ => {}
        }
    }
}

/// Changes accumulated during one debounce window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PendingChanges {
    kind: Option<WatchKind>,
    paths: BTreeSet<VaultPath>,
}

impl PendingChanges {
    fn merge(&mut self, kind: WatchKind, paths: BTreeSet<VaultPath>) {
        self.kind = Some(match self.kind.take() {
            Some(old) if rank_kind(&old) > rank_kind(&kind) => old,
            _ => kind,
        });
        self.paths.extend(paths);
    }

    fn take_cause(&mut self) -> ReindexCause {
        let taken = std::mem::take(self);
        ReindexCause::Watch {
            kind: taken.kind.unwrap_or(WatchKind::Other),
            paths: taken.paths,
        }
    }
}

/// Single-owner event loop behind `VaultService::start_watching`.
pub(crate) struct WatchLoop {
    pub vault: Vault,
    pub events: broadcast::Sender<VaultEvent>,
    /// Kept here so the root watch can be re-registered; `None` in tests.
    pub watcher: Option<notify::RecommendedWatcher>,
}

type RawEvent = std::result::Result<notify::Event, notify::Error>;

impl WatchLoop {
    pub async fn run<R, Fut>(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
        rebuild: R,
    ) where
        R: Fn(ReindexCause) -> Fut,
        Fut: Future<Output = Result<RebuildSummary>> + Send + 'static,
    {
        let mut debouncer = Debouncer::new(self.vault.config().watch_debounce);
        let mut pending = PendingChanges::default();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<bool>();

        let timer = tokio::time::sleep(Duration::from_secs(60 * 60 * 24 * 365));
        tokio::pin!(timer);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                maybe = raw_rx.recv() => {
                    let Some(res) = maybe else { break; };
                    match res {
                        Ok(ev) => {
                            if touches_root(self.vault.root(), &ev) {
                                self.rewatch();
                                // Every note may have moved with the root.
                                pending.merge(watch_kind_from_event_kind(&ev.kind), BTreeSet::new());
                                debouncer.on_change(Instant::now());
                            } else if let Some((kind, paths)) = classify(&self.vault, &ev) {
                                debug!(?kind, paths = paths.len(), "change queued");
                                pending.merge(kind, paths);
                                debouncer.on_change(Instant::now());
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "filesystem watcher error; continuing");
                            let _ = self.events.send(VaultEvent::Error {
                                path: None,
                                error: err.to_string(),
                            });
                            self.rewatch();
                            // Events may have been lost; rescan to be safe.
                            pending.merge(WatchKind::Other, BTreeSet::new());
                            debouncer.on_change(Instant::now());
                        }
                    }
                }

                _ = &mut timer, if debouncer.deadline().is_some() => {
                    if debouncer.on_deadline() {
                        let cause = pending.take_cause();
                        info!(?cause, "debounce elapsed; rebuilding");
                        let job = tokio::spawn(rebuild(cause));
                        let done = done_tx.clone();
                        // A panicking rebuild still reports back, as a failure.
                        tokio::spawn(async move {
                            let ok = matches!(job.await, Ok(Ok(_)));
                            let _ = done.send(ok);
                        });
                    }
                }

                Some(ok) = done_rx.recv() => {
                    debug!(ok, "rebuild finished");
                    debouncer.on_rebuild_finished(Instant::now());
                }
            }

            if let Some(deadline) = debouncer.deadline() {
                if timer.deadline() != deadline {
                    timer.as_mut().reset(deadline);
                }
            }
        }
    }

    fn rewatch(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        let root = self.vault.root();
        let _ = watcher.unwatch(root);
        match watcher.watch(root, RecursiveMode::Recursive) {
            Ok(()) => info!(root = %root.display(), "re-registered vault watch"),
            Err(err) => {
                warn!(root = %root.display(), error = %err, "could not re-register vault watch");
                let _ = self.events.send(VaultEvent::Error {
                    path: None,
                    error: err.to_string(),
                });
            }
        }
    }
}

fn touches_root(root: &Path, ev: &notify::Event) -> bool {
    matches!(
        ev.kind,
        EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    ) && ev.paths.iter().any(|p| p == root)
}

/// Maps a raw event to the note paths it affects, or `None` when irrelevant.
pub(crate) fn classify(vault: &Vault, ev: &notify::Event) -> Option<(WatchKind, BTreeSet<VaultPath>)> {
    // Reading files (including our own reads) produces access/metadata events.
    match &ev.kind {
        EventKind::Access(_) => return None,
        EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return None,
        _ => {}
    }

    let kind = watch_kind_from_event_kind(&ev.kind);
    if ev.need_rescan() {
        return Some((WatchKind::Other, BTreeSet::new()));
    }

    let mut paths = BTreeSet::new();
    let mut directory_touched = false;
    for p in &ev.paths {
        let Ok(rel) = vault.to_rel(p) else {
            continue;
        };
        if vault.is_note_rel(rel.as_path()) {
            paths.insert(rel);
        } else if matches!(kind, WatchKind::Remove | WatchKind::Rename)
            && rel.as_path().extension().is_none()
            && !vault.is_ignored_rel(rel.as_path())
        {
            // A removed or renamed directory may carry notes with it.
            directory_touched = true;
        }
    }

    if paths.is_empty() && !directory_touched {
        return None;
    }
    Some((kind, paths))
}

fn watch_kind_from_event_kind(kind: &EventKind) -> WatchKind {
    match kind {
        EventKind::Create(_) => WatchKind::Create,
        EventKind::Remove(_) => WatchKind::Remove,
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => WatchKind::Rename,
        EventKind::Modify(notify::event::ModifyKind::Data(_)) => WatchKind::ModifyData,
        EventKind::Modify(_) => WatchKind::Modify,
        _ => WatchKind::Other,
    }
}

fn rank_kind(kind: &WatchKind) -> u8 {
    match kind {
        WatchKind::Remove => 90,
        WatchKind::Rename => 80,
        WatchKind::Create => 70,
        WatchKind::ModifyData => 60,
        WatchKind::Modify => 50,
        WatchKind::Other => 20,
    }
}
