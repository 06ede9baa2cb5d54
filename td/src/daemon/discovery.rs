//! Specs-directory discovery (spec.md §4.1 "Algorithm — discovery").
//!
//! Watches `{projectDir}/specs` for directory creations and
//! `implementation_plan.json` changes via `notify`, with a 100ms
//! stabilization window to collapse bursts (spec.md §5 Backpressure), and
//! falls back to a full periodic re-scan to recover from missed events.
//! Either source lands on the same channel; the daemon treats a "wake up
//! and re-scan" signal identically regardless of which source produced it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::Plan;

const STABILIZATION_WINDOW: Duration = Duration::from_millis(100);

/// In-memory index of specs discovered on disk, keyed by `specId`. Rebuilt
/// from a full directory re-scan and kept current by individual file
/// events in between.
#[derive(Debug, Default, Clone)]
pub struct SpecsIndex {
    plans: HashMap<String, Plan>,
}

impl SpecsIndex {
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn get(&self, spec_id: &str) -> Option<&Plan> {
        self.plans.get(spec_id)
    }

    pub fn plans(&self) -> impl Iterator<Item = &Plan> {
        self.plans.values()
    }

    fn insert(&mut self, plan: Plan) {
        self.plans.insert(plan.spec_id.clone(), plan);
    }

    fn remove(&mut self, spec_id: &str) {
        self.plans.remove(spec_id);
    }
}

/// A wake-up signal: either "re-read this one spec's plan" or "re-scan
/// everything". The supervisor treats both the same way — update the
/// index, then re-run admission — so a coalesced burst of file events
/// collapses to the same handling as a rescan tick.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    SpecChanged(String),
    FullRescan,
}

/// Watches the specs directory and emits [`DiscoveryEvent`]s, maintaining
/// the daemon's in-memory [`SpecsIndex`].
pub struct SpecDiscovery {
    specs_dir: PathBuf,
    index: SpecsIndex,
    _watcher: Option<RecommendedWatcher>,
}

impl SpecDiscovery {
    /// Build the index from a full directory scan without starting the
    /// filesystem watch (used for the daemon's startup scan and for
    /// one-shot callers like `td daemon status`).
    pub fn scan(specs_dir: impl Into<PathBuf>) -> std::io::Result<SpecsIndex> {
        let specs_dir = specs_dir.into();
        let mut index = SpecsIndex::default();

        if !specs_dir.exists() {
            return Ok(index);
        }

        for entry in std::fs::read_dir(&specs_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let plan_path = entry.path().join("implementation_plan.json");
            match Self::read_plan(&plan_path) {
                Ok(Some(plan)) => index.insert(plan),
                Ok(None) => {}
                Err(e) => warn!(path = %plan_path.display(), error = %e, "discovery: failed to parse plan, skipping"),
            }
        }

        Ok(index)
    }

    fn read_plan(plan_path: &Path) -> std::io::Result<Option<Plan>> {
        if !plan_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(plan_path)?;
        let plan: Plan = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(plan))
    }

    /// Start watching `specs_dir`, returning the discovery handle and a
    /// receiver of coalesced [`DiscoveryEvent`]s. `rescan_interval` drives
    /// the periodic full-rescan fallback.
    pub fn watch(specs_dir: impl Into<PathBuf>, rescan_interval: Duration) -> eyre::Result<(Self, mpsc::Receiver<DiscoveryEvent>)> {
        let specs_dir = specs_dir.into();
        let index = Self::scan(&specs_dir)?;

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<NotifyEvent>();
        let (tx, rx) = mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(e) => warn!(error = %e, "discovery: watch error"),
        })?;

        if specs_dir.exists() {
            watcher.watch(&specs_dir, RecursiveMode::Recursive)?;
        } else {
            warn!(path = %specs_dir.display(), "discovery: specs directory does not exist yet, watch deferred");
        }

        // Debounce: collapse a burst of raw filesystem events for the same
        // spec into a single `SpecChanged` within the stabilization window.
        let debounce_tx = tx.clone();
        tokio::spawn(async move {
            let mut pending: HashMap<String, ()> = HashMap::new();
            loop {
                let first = match raw_rx.recv().await {
                    Some(event) => event,
                    None => break,
                };
                pending.clear();
                for spec_id in spec_ids_from_event(&first) {
                    pending.insert(spec_id, ());
                }

                let deadline = tokio::time::sleep(STABILIZATION_WINDOW);
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        maybe_event = raw_rx.recv() => {
                            match maybe_event {
                                Some(event) => {
                                    for spec_id in spec_ids_from_event(&event) {
                                        pending.insert(spec_id, ());
                                    }
                                }
                                None => break,
                            }
                        }
                    }
                }

                for spec_id in pending.keys() {
                    if debounce_tx.send(DiscoveryEvent::SpecChanged(spec_id.clone())).await.is_err() {
                        return;
                    }
                }
            }
        });

        // Periodic full rescan, the fallback for missed filesystem events.
        let rescan_tx = tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rescan_interval);
            ticker.tick().await; // first tick fires immediately; skip it, `scan` above already ran
            loop {
                ticker.tick().await;
                if rescan_tx.send(DiscoveryEvent::FullRescan).await.is_err() {
                    return;
                }
            }
        });

        Ok((
            Self {
                specs_dir,
                index,
                _watcher: Some(watcher),
            },
            rx,
        ))
    }

    /// Apply one discovery event to the in-memory index, returning the set
    /// of specIds that changed (empty for a rescan that found nothing new).
    pub fn apply(&mut self, event: &DiscoveryEvent) -> Vec<String> {
        match event {
            DiscoveryEvent::SpecChanged(spec_id) => {
                let plan_path = self.specs_dir.join(spec_id).join("implementation_plan.json");
                match Self::read_plan(&plan_path) {
                    Ok(Some(plan)) => {
                        self.index.insert(plan);
                        vec![spec_id.clone()]
                    }
                    Ok(None) => {
                        self.index.remove(spec_id);
                        vec![spec_id.clone()]
                    }
                    Err(e) => {
                        warn!(%spec_id, error = %e, "discovery: failed to reparse changed plan");
                        Vec::new()
                    }
                }
            }
            DiscoveryEvent::FullRescan => {
                debug!(specs_dir = %self.specs_dir.display(), "discovery: running full rescan");
                match Self::scan(&self.specs_dir) {
                    Ok(fresh) => {
                        let changed: Vec<String> = fresh.plans.keys().cloned().collect();
                        self.index = fresh;
                        changed
                    }
                    Err(e) => {
                        warn!(error = %e, "discovery: rescan failed");
                        Vec::new()
                    }
                }
            }
        }
    }

    pub fn index(&self) -> &SpecsIndex {
        &self.index
    }
}

/// `notify` fires path-level events; a spec's identity is its immediate
/// child directory name under `specs/`.
fn spec_ids_from_event(event: &NotifyEvent) -> Vec<String> {
    event
        .paths
        .iter()
        .filter_map(|p| {
            // .../specs/{specId}/implementation_plan.json or .../specs/{specId}
            let mut components = p.components().rev();
            let first = components.next()?;
            let candidate = if first.as_os_str() == "implementation_plan.json" {
                components.next()?
            } else {
                first
            };
            Some(candidate.as_os_str().to_string_lossy().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskPriority;
    use tempfile::tempdir;

    fn write_plan(specs_dir: &Path, spec_id: &str) {
        let dir = specs_dir.join(spec_id);
        std::fs::create_dir_all(&dir).unwrap();
        let plan = Plan::new(spec_id, crate::domain::TaskKind::Impl, TaskPriority::default());
        std::fs::write(dir.join("implementation_plan.json"), serde_json::to_vec(&plan).unwrap()).unwrap();
    }

    #[test]
    fn scan_finds_plans_in_subdirectories() {
        let dir = tempdir().unwrap();
        write_plan(dir.path(), "001-a");
        write_plan(dir.path(), "002-b");

        let index = SpecDiscovery::scan(dir.path()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.get("001-a").is_some());
    }

    #[test]
    fn scan_of_missing_directory_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let index = SpecDiscovery::scan(dir.path().join("nonexistent")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn scan_skips_directories_with_no_plan_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("stray-dir")).unwrap();
        let index = SpecDiscovery::scan(dir.path()).unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn apply_full_rescan_picks_up_new_spec() {
        let dir = tempdir().unwrap();
        write_plan(dir.path(), "001-a");
        let (mut discovery, _rx) = SpecDiscovery::watch(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(discovery.index().len(), 1);

        write_plan(dir.path(), "002-b");
        let changed = discovery.apply(&DiscoveryEvent::FullRescan);
        assert_eq!(discovery.index().len(), 2);
        assert!(changed.contains(&"002-b".to_string()));
    }

    #[tokio::test]
    async fn apply_spec_changed_reparses_single_plan() {
        let dir = tempdir().unwrap();
        write_plan(dir.path(), "001-a");
        let (mut discovery, _rx) = SpecDiscovery::watch(dir.path(), Duration::from_secs(3600)).unwrap();

        let mut plan = discovery.index().get("001-a").unwrap().clone();
        plan.status = crate::domain::TaskStatus::InProgress;
        std::fs::write(
            dir.path().join("001-a").join("implementation_plan.json"),
            serde_json::to_vec(&plan).unwrap(),
        )
        .unwrap();

        let changed = discovery.apply(&DiscoveryEvent::SpecChanged("001-a".to_string()));
        assert_eq!(changed, vec!["001-a".to_string()]);
        assert_eq!(discovery.index().get("001-a").unwrap().status, crate::domain::TaskStatus::InProgress);
    }

    #[test]
    fn spec_ids_from_event_handles_plan_file_and_directory_paths() {
        let event = NotifyEvent::new(notify::EventKind::Create(notify::event::CreateKind::File)).add_path(
            PathBuf::from("/proj/specs/003-c/implementation_plan.json"),
        );
        assert_eq!(spec_ids_from_event(&event), vec!["003-c".to_string()]);

        let event = NotifyEvent::new(notify::EventKind::Create(notify::event::CreateKind::Folder))
            .add_path(PathBuf::from("/proj/specs/004-d"));
        assert_eq!(spec_ids_from_event(&event), vec!["004-d".to_string()]);
    }
}
