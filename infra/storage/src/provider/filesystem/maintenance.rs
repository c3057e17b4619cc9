use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Marker embedded in the name of every in-flight temporary file.
pub(crate) const TMP_MARKER: &str = ".depottmp.";

/// Temp files younger than this may belong to a live writer and are left alone.
const STALE_AFTER: Duration = Duration::from_secs(300);

/// A sibling of `target` no other writer of this provider will pick.
pub(crate) fn unique_tmp_path(target: &Path, counter: &AtomicU64) -> PathBuf {
    let counter = counter.fetch_add(1, Ordering::Relaxed);
    let file_name = target.file_name().and_then(|name| name.to_str()).unwrap_or("entry");
    target.with_file_name(format!("{file_name}{TMP_MARKER}{}.{counter}", std::process::id()))
}

pub(crate) fn is_tmp_name(name: &str) -> bool {
    name.contains(TMP_MARKER)
}

/// Removes temp files left behind by crashed writers anywhere below `root`.
pub(crate) fn purge_tmp(root: &Path) {
    let (removed, failed) = remove_stale(root, SystemTime::now(), STALE_AFTER);
    if removed > 0 || failed > 0 {
        info!(path = %root.display(), removed, failed, "Cleaned up temporary files");
    }
}

pub(crate) async fn purge_tmp_async(root: &Path) {
    let root = root.to_path_buf();
    if let Err(err) = tokio::task::spawn_blocking(move || purge_tmp(&root)).await {
        warn!(error = %err, "Temp file cleanup task panicked");
    }
}

fn remove_stale(root: &Path, now: SystemTime, threshold: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    for entry in WalkDir::new(root).into_iter().flatten() {
        if !is_tmp(&entry) || !is_stale(&entry, now, threshold) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "Failed to remove temp file");
                failed += 1;
            },
        }
    }

    (removed, failed)
}

fn is_tmp(entry: &DirEntry) -> bool {
    entry.file_type().is_file() && entry.file_name().to_str().is_some_and(is_tmp_name)
}

fn is_stale(entry: &DirEntry, now: SystemTime, threshold: Duration) -> bool {
    entry
        .metadata()
        .ok()
        .and_then(|meta| meta.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_none_or(|age| age > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_names_are_unique_and_recognised() {
        let counter = AtomicU64::new(0);
        let a = unique_tmp_path(Path::new("/data/report.pdf"), &counter);
        let b = unique_tmp_path(Path::new("/data/report.pdf"), &counter);
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(Path::new("/data")));
        assert!(is_tmp_name(a.file_name().unwrap().to_str().unwrap()));
        assert!(!is_tmp_name("report.pdf"));
    }

    #[test]
    fn only_stale_tmp_files_are_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let orphan = nested.join(format!("a.bin{TMP_MARKER}1.1"));
        let keeper = nested.join("a.bin");
        std::fs::write(&orphan, b"partial").unwrap();
        std::fs::write(&keeper, b"data").unwrap();

        let future = SystemTime::now() + Duration::from_secs(3600);
        let (removed, failed) = remove_stale(tmp.path(), future, STALE_AFTER);
        assert_eq!((removed, failed), (1, 0));
        assert!(!orphan.exists());
        assert!(keeper.exists());
        assert!(nested.exists(), "directories are never pruned");

        std::fs::write(&orphan, b"fresh").unwrap();
        assert_eq!(remove_stale(tmp.path(), SystemTime::now(), STALE_AFTER), (0, 0));
    }
}
