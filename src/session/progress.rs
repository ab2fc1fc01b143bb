//! Polling watcher for a run's pipeline directory.
//!
//! Each tick walks the directory, compares the set of relative paths with the
//! previous tick and publishes one [`ProgressEvent`] per added or removed
//! entry. A directory that does not exist yet is an empty set, so the whole
//! tree shows up as additions once the pipeline tool creates it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use walkdir::WalkDir;

use super::events::{Broadcaster, ChangeKind, ProgressEvent};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct ProgressWatcher {
    dir: PathBuf,
    interval: Duration,
    max_depth: usize,
}

impl ProgressWatcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Relative paths currently under the directory.
    pub fn scan(&self) -> BTreeSet<String> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.dir)
                    .ok()
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect()
    }

    /// Poll until the returned handle is aborted.
    pub fn spawn(self, sink: Broadcaster<ProgressEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut seen = self.scan();
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let watcher = self.clone();
                let current = match tokio::task::spawn_blocking(move || watcher.scan()).await {
                    Ok(current) => current,
                    Err(e) => {
                        tracing::warn!(dir = %self.dir.display(), error = %e, "Progress scan failed");
                        continue;
                    }
                };
                for event in diff(&seen, &current) {
                    tracing::debug!(path = %event.path, kind = ?event.kind, "Pipeline progress");
                    sink.publish(event);
                }
                seen = current;
            }
        })
    }
}

/// Changes from `before` to `after`: additions first, then removals, each sorted.
pub fn diff(before: &BTreeSet<String>, after: &BTreeSet<String>) -> Vec<ProgressEvent> {
    let added = after.difference(before).map(|p| ProgressEvent {
        kind: ChangeKind::Added,
        path: p.clone(),
    });
    let removed = before.difference(after).map(|p| ProgressEvent {
        kind: ChangeKind::Removed,
        path: p.clone(),
    });
    added.chain(removed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_reports_added_then_removed() {
        let events = diff(&set(&["a", "b"]), &set(&["b", "c"]));
        assert_eq!(
            events,
            vec![
                ProgressEvent {
                    kind: ChangeKind::Added,
                    path: "c".into()
                },
                ProgressEvent {
                    kind: ChangeKind::Removed,
                    path: "a".into()
                },
            ]
        );
        assert!(diff(&set(&["a"]), &set(&["a"])).is_empty());
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let watcher = ProgressWatcher::new(tmp.path().join("later"), DEFAULT_POLL_INTERVAL);
        assert!(watcher.scan().is_empty());
    }

    #[test]
    fn test_scan_respects_depth() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("01_Rarefier/output/deep")).unwrap();
        let watcher = ProgressWatcher::new(tmp.path(), DEFAULT_POLL_INTERVAL).with_max_depth(2);
        let found = watcher.scan();
        assert!(found.contains("01_Rarefier"));
        assert!(found.contains("01_Rarefier/output"));
        assert!(!found.contains("01_Rarefier/output/deep"));
    }

    #[tokio::test]
    async fn test_spawned_watcher_publishes_new_entries() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("run1_2024Jan5");
        let sink = Broadcaster::new();
        let mut rx = sink.subscribe();
        let handle = ProgressWatcher::new(&dir, Duration::from_millis(20)).spawn(sink);

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::create_dir_all(dir.join("00_ImportMetadata")).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should report the new directory")
            .unwrap();
        assert_eq!(event.kind, ChangeKind::Added);
        assert_eq!(event.path, "00_ImportMetadata");
        handle.abort();
    }
}
