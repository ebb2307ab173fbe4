//! Watch command - keep the index current while the vault changes.
//!
//! Filesystem events from a `notify` watcher are translated into vault
//! change notifications for the data manager. Bursts are coalesced by the
//! manager's buffer, which flushes on its own once enough changes pile up;
//! whatever is still pending after a quiet period is flushed here.

use crate::app::App;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use quarry_core::{ChangeKind, Config, DataManager, FsDocumentSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

type Change = (String, ChangeKind);

/// Files at or below `path`.
fn files_under(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

fn appeared(source: &FsDocumentSource, path: &Path, kind: ChangeKind) -> Vec<Change> {
    files_under(path)
        .iter()
        .filter_map(|file| source.relative(file))
        .map(|rel| (rel, kind.clone()))
        .collect()
}

fn renamed(source: &FsDocumentSource, from: &Path, to: &Path) -> Vec<Change> {
    match (source.relative(from), source.relative(to)) {
        (Some(old), Some(_)) => files_under(to)
            .iter()
            .filter_map(|file| {
                let new_path = source.relative(file)?;
                let suffix = file.strip_prefix(to).ok()?;
                let old_path = if suffix.as_os_str().is_empty() {
                    old.clone()
                } else {
                    let parts: Vec<String> = suffix
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    format!("{}/{}", old, parts.join("/"))
                };
                Some((new_path, ChangeKind::Renamed { old_path }))
            })
            .collect(),
        // Moved into the vault from outside
        (None, Some(_)) => appeared(source, to, ChangeKind::Created),
        // Moved out of the vault
        (Some(old), None) => vec![(old, ChangeKind::Deleted)],
        (None, None) => Vec::new(),
    }
}

/// Map one filesystem event to vault changes.
///
/// Paths outside the vault and excluded paths are dropped. A renamed
/// folder yields one rename per file inside it.
fn translate(source: &FsDocumentSource, config: &Config, event: &Event) -> Vec<Change> {
    let mut changes = Vec::new();

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = event.paths.as_slice() {
                changes.extend(renamed(source, from, to));
            }
        }
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for path in &event.paths {
                changes.extend(appeared(source, path, ChangeKind::Created));
            }
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            changes.extend(
                event
                    .paths
                    .iter()
                    .filter_map(|path| source.relative(path))
                    .map(|rel| (rel, ChangeKind::Deleted)),
            );
        }
        // Rename halves the backend could not pair up
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                if path.exists() {
                    changes.extend(appeared(source, path, ChangeKind::Created));
                } else if let Some(rel) = source.relative(path) {
                    changes.push((rel, ChangeKind::Deleted));
                }
            }
        }
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            changes.extend(
                event
                    .paths
                    .iter()
                    .filter(|path| path.is_file())
                    .filter_map(|path| source.relative(path))
                    .map(|rel| (rel, ChangeKind::Modified)),
            );
        }
        _ => {}
    }

    changes.retain(|(path, kind)| {
        matches!(kind, ChangeKind::Renamed { .. }) || !config.should_exclude(path)
    });
    changes
}

/// Feed watcher events to the manager until the watcher goes away.
///
/// Pending changes are flushed once no event has arrived for `idle`.
fn pump(
    manager: &DataManager,
    source: &FsDocumentSource,
    config: &Config,
    events: &Receiver<notify::Result<Event>>,
    idle: Duration,
) {
    loop {
        match events.recv_timeout(idle) {
            Ok(Ok(event)) => {
                for (path, kind) in translate(source, config, &event) {
                    info!(kind = %kind, file = %path, "Change detected");
                    manager.notify_document_changed(&path, kind);
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Watcher error"),
            Err(RecvTimeoutError::Timeout) => {
                if manager.pending() > 0 {
                    let applied = manager.flush();
                    debug!(applied, "Flushed changes after quiet period");
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                manager.flush();
                break;
            }
        }
    }
}

/// Start a recursive watcher on `root` that forwards into a channel.
fn watch_vault(
    root: &Path,
) -> anyhow::Result<(RecommendedWatcher, Receiver<notify::Result<Event>>)> {
    let (tx, rx) = unbounded();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Run the watch command.
pub fn run(config: Config, vault: Option<PathBuf>, idle_ms: u64) -> anyhow::Result<()> {
    let app = App::new(config, vault)?;
    let documents = app.open()?;

    // Some backends report canonical paths
    let root = app.vault.canonicalize().unwrap_or_else(|_| app.vault.clone());
    let source = FsDocumentSource::new(&root, Arc::clone(&app.config));
    let (_watcher, events) = watch_vault(&root)?;

    println!("Watching {} ({} documents)", root.display(), documents);
    println!("Press Ctrl+C to stop.");
    println!();

    pump(
        &app.manager,
        &source,
        &app.config,
        &events,
        Duration::from_millis(idle_ms.max(50)),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::MemorySnapshotStore;
    use std::fs;
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    fn vault() -> (TempDir, FsDocumentSource, Config) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = Config::default();
        let source = FsDocumentSource::new(&root, Arc::new(config.clone()));
        (dir, source, config)
    }

    fn event(kind: EventKind, paths: &[PathBuf]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(path.clone()))
    }

    #[test]
    fn test_rename_event_maps_to_renamed() {
        let (_dir, source, config) = vault();
        let root = source.root().to_path_buf();
        fs::write(root.join("b.md"), "moved").unwrap();

        let changes = translate(
            &source,
            &config,
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[root.join("a.md"), root.join("b.md")],
            ),
        );
        assert_eq!(
            changes,
            vec![(
                "b.md".to_string(),
                ChangeKind::Renamed {
                    old_path: "a.md".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_folder_rename_maps_each_file() {
        let (_dir, source, config) = vault();
        let root = source.root().to_path_buf();
        fs::create_dir_all(root.join("new/sub")).unwrap();
        fs::write(root.join("new/sub/n.md"), "x").unwrap();

        let changes = translate(
            &source,
            &config,
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &[root.join("old"), root.join("new")],
            ),
        );
        assert_eq!(
            changes,
            vec![(
                "new/sub/n.md".to_string(),
                ChangeKind::Renamed {
                    old_path: "old/sub/n.md".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_create_remove_and_modify() {
        let (_dir, source, config) = vault();
        let root = source.root().to_path_buf();
        fs::write(root.join("n.md"), "x").unwrap();

        let created = translate(
            &source,
            &config,
            &event(EventKind::Create(notify::event::CreateKind::File), &[root.join("n.md")]),
        );
        assert_eq!(created, vec![("n.md".to_string(), ChangeKind::Created)]);

        let modified = translate(
            &source,
            &config,
            &event(
                EventKind::Modify(ModifyKind::Data(notify::event::DataChange::Content)),
                &[root.join("n.md")],
            ),
        );
        assert_eq!(modified, vec![("n.md".to_string(), ChangeKind::Modified)]);

        let removed = translate(
            &source,
            &config,
            &event(EventKind::Remove(notify::event::RemoveKind::File), &[root.join("gone.md")]),
        );
        assert_eq!(removed, vec![("gone.md".to_string(), ChangeKind::Deleted)]);

        let metadata = translate(
            &source,
            &config,
            &event(
                EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Any)),
                &[root.join("n.md")],
            ),
        );
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_excluded_and_outside_paths_are_dropped() {
        let (_dir, source, config) = vault();
        let root = source.root().to_path_buf();
        fs::create_dir_all(root.join(".obsidian")).unwrap();
        fs::write(root.join(".obsidian/workspace.json"), "{}").unwrap();

        let changes = translate(
            &source,
            &config,
            &event(
                EventKind::Create(notify::event::CreateKind::Any),
                &[root.join(".obsidian/workspace.json"), PathBuf::from("/elsewhere/x.md")],
            ),
        );
        assert!(changes.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_watched_rename_reaches_index() {
        let (_dir, source, config) = vault();
        let root = source.root().to_path_buf();
        fs::write(root.join("a.md"), "walrus").unwrap();

        let config = Arc::new(config);
        let manager = DataManager::new(
            Arc::clone(&config),
            Arc::new(FsDocumentSource::new(&root, Arc::clone(&config))),
            Arc::new(MemorySnapshotStore::new()),
            None,
        );
        manager.initialize().unwrap();
        assert!(manager.engine().contains("a.md"));

        let (watcher, events) = watch_vault(&root).unwrap();
        thread::scope(|scope| {
            let pumping = scope.spawn(|| {
                pump(&manager, &source, &config, &events, Duration::from_millis(50))
            });

            fs::rename(root.join("a.md"), root.join("b.md")).unwrap();

            let deadline = Instant::now() + Duration::from_secs(5);
            while !manager.engine().contains("b.md") && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(20));
            }
            drop(watcher);
            pumping.join().unwrap();
        });

        assert!(manager.engine().contains("b.md"));
        assert!(!manager.engine().contains("a.md"));
    }
}
