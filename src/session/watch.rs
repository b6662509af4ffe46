//! Test-file change detection

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::common::Result;

use super::handle::Session;

/// Resets the running test whenever a file under the test directory changes
///
/// Watching stops when the value is dropped.
pub struct TestFileWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl TestFileWatcher {
    pub fn start(dir: &Path, session: Session) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_content_change(&event) => {
                tracing::debug!(paths = ?event.paths, "Test file changed");
                if let Err(e) = session.request_reload() {
                    tracing::warn!("Could not reset after file change: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("File watch error: {}", e),
        })?;
        watcher.watch(dir, RecursiveMode::Recursive)?;

        tracing::debug!(dir = %dir.display(), "Watching test files");
        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TestFileWatcher {
    fn drop(&mut self) {
        tracing::debug!(dir = %self.dir.display(), "Stopped watching test files");
    }
}

fn is_content_change(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    #[test]
    fn test_only_content_changes_count() {
        assert!(is_content_change(&Event::new(EventKind::Create(CreateKind::File))));
        assert!(is_content_change(&Event::new(EventKind::Modify(ModifyKind::Any))));
        assert!(!is_content_change(&Event::new(EventKind::Access(AccessKind::Any))));
    }
}
