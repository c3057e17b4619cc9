use super::{FileSystemStorageProvider, entry_kind, io_context, listing, listing_name, parent_label};
use super::sandbox::is_absent;
use crate::error::{StorageError, StorageErrorExt};
use crate::mode::FileMode;
use crate::provider::{EntryKind, StorageProvider, rules};
use crate::stream::{FileStream, Stream};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

impl FileSystemStorageProvider {
    fn probe(path: &Path) -> Result<Option<EntryKind>, StorageError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(entry_kind(&meta))),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) => Err(err).context(io_context("Failed to inspect", path)),
        }
    }

    fn require_parent(path: &str, target: &Path) -> Result<(), StorageError> {
        let found = match target.parent() {
            Some(parent) => Self::probe(parent)?,
            None => Some(EntryKind::Directory),
        };
        rules::require_directory(&parent_label(path), found)
    }

    /// Writes a temp sibling of `target` through `fill` and swaps it into place.
    ///
    /// `CreateNew` commits with a hard link, so an entry that appeared after the
    /// precondition check is never clobbered.
    pub(super) fn swap<F>(&self, target: &Path, mode: FileMode, fill: F) -> Result<u64, StorageError>
    where
        F: FnOnce(&mut File) -> io::Result<u64>,
    {
        let temp = self.tmp_path(target);

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .and_then(|mut file| {
                let written = fill(&mut file)?;
                file.sync_all()?;
                Ok(written)
            });
        let written = match written {
            Ok(written) => written,
            Err(err) => {
                discard(&temp);
                return Err(err).context(io_context("Temp write failed", &temp));
            },
        };

        let committed = if mode == FileMode::CreateNew {
            fs::hard_link(&temp, target).map(|()| discard(&temp))
        } else {
            replace(&temp, target)
        };
        if let Err(err) = committed {
            discard(&temp);
            if err.kind() == io::ErrorKind::AlreadyExists {
                return Err(StorageError::already_exists(target.display().to_string()));
            }
            return Err(err).context(io_context("Atomic swap failed", target));
        }

        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        debug!(path = %target.display(), bytes = written, "File saved atomically");
        Ok(written)
    }

    fn write_with<F>(&self, path: &str, mode: FileMode, fill: F) -> Result<u64, StorageError>
    where
        F: FnOnce(&mut File) -> io::Result<u64>,
    {
        let target = self.resolve(path)?;
        let mode = rules::check_write(path, mode, Self::probe(&target)?)?;
        Self::require_parent(path, &target)?;

        if mode != FileMode::Append {
            return self.swap(&target, mode, fill);
        }

        let mut file =
            mode.open_options().open(&target).context(io_context("Failed to open", &target))?;
        let written = fill(&mut file).context(io_context("Append failed", &target))?;
        file.sync_all().context(io_context("Hardware sync failed", &target))?;
        debug!(path = %target.display(), bytes = written, "Data appended");
        Ok(written)
    }

    fn list_kind(&self, path: &str, wanted: EntryKind) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(path)?;
        rules::require_directory(path, Self::probe(&dir)?)?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).context(io_context("Failed to list", &dir))? {
            let entry = entry.context(io_context("Failed to list", &dir))?;
            let kind = match fs::metadata(entry.path()) {
                Ok(meta) => entry_kind(&meta),
                // Dangling symlinks and entries removed mid-listing.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err).context(io_context("Failed to inspect", &entry.path())),
            };
            if kind == wanted
                && let Some(name) = listing_name(&entry.file_name())
            {
                names.push(name);
            }
        }
        Ok(listing(path, names))
    }

    fn relocate(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
        keep_source: bool,
    ) -> Result<(), StorageError> {
        let source = self.resolve(path)?;
        rules::require_file(path, Self::probe(&source)?)?;
        let target = self.resolve(new_path)?;
        let replace = rules::check_destination(new_path, Self::probe(&target)?, overwrite)?;
        Self::require_parent(new_path, &target)?;

        let mode = if replace { FileMode::Create } else { FileMode::CreateNew };
        if keep_source {
            self.swap(&target, mode, |file| io::copy(&mut File::open(&source)?, file))?;
            debug!(from = %source.display(), to = %target.display(), "File copied");
            return Ok(());
        }

        let moved = if replace {
            fs::rename(&source, &target)
        } else {
            fs::hard_link(&source, &target).and_then(|()| fs::remove_file(&source))
        };
        moved.map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                StorageError::already_exists(new_path.to_owned())
            } else {
                StorageError::Io { source: err, context: Some(io_context("Move failed", &source).into()) }
            }
        })?;
        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        debug!(from = %source.display(), to = %target.display(), "File moved");
        Ok(())
    }
}

impl StorageProvider for FileSystemStorageProvider {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        Some(self.display_root())
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        self.resolve(path).map(|resolved| resolved.display().to_string())
    }

    fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        self.write_with(path, mode, |file| {
            file.write_all(data)?;
            Ok(data.len() as u64)
        })
        .map(|_| ())
    }

    fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut dyn Read,
    ) -> Result<u64, StorageError> {
        self.write_with(path, mode, |file| io::copy(source, file))
    }

    fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let resolved = self.resolve(path)?;
        rules::require_file(path, Self::probe(&resolved)?)?;
        let file = File::open(&resolved).context(io_context("Failed to open", &resolved))?;
        Ok(Box::new(FileStream::reader(file)))
    }

    /// Streams write in place; only whole-buffer writes get the atomic swap.
    fn write_stream(&self, path: &str, mode: FileMode) -> Result<Box<dyn Stream>, StorageError> {
        let target = self.resolve(path)?;
        let mode = rules::check_write(path, mode, Self::probe(&target)?)?;
        Self::require_parent(path, &target)?;
        let file = mode.open_options().open(&target).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                StorageError::already_exists(path.to_owned())
            } else {
                StorageError::Io { source: err, context: Some(io_context("Failed to open", &target).into()) }
            }
        })?;
        Ok(Box::new(FileStream::writer(file)))
    }

    fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        if self.is_root_dir(&dir) {
            return Err(StorageError::invalid_argument("the provider root cannot be deleted"));
        }
        rules::require_directory(path, Self::probe(&dir)?)?;

        if recursive {
            fs::remove_dir_all(&dir).context(io_context("Failed to delete", &dir))?;
        } else {
            let mut entries = fs::read_dir(&dir).context(io_context("Failed to list", &dir))?;
            if entries.next().is_some() {
                return Ok(false);
            }
            fs::remove_dir(&dir).context(io_context("Failed to delete", &dir))?;
        }
        debug!(path = %dir.display(), recursive, "Directory deleted");
        Ok(true)
    }

    fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        if !rules::check_create_directory(path, Self::probe(&dir)?)? {
            return Ok(false);
        }
        Self::require_parent(path, &dir)?;
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "Directory created");
                Ok(true)
            },
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                rules::check_create_directory(path, Self::probe(&dir)?)
            },
            Err(err) => Err(err).context(io_context("Failed to create", &dir)),
        }
    }

    fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        Ok(Self::probe(&dir)? == Some(EntryKind::Directory))
    }

    fn move_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        self.relocate(path, new_path, overwrite, false)
    }

    fn copy_file(&self, path: &str, new_path: &str, overwrite: bool) -> Result<(), StorageError> {
        self.relocate(path, new_path, overwrite, true)
    }

    fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.resolve(path)?;
        rules::require_file(path, Self::probe(&file)?)?;
        fs::remove_file(&file).context(io_context("Failed to delete", &file))?;
        debug!(path = %file.display(), "File deleted");
        Ok(true)
    }

    fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.resolve(path)?;
        Ok(Self::probe(&file)? == Some(EntryKind::File))
    }

    fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind(path, EntryKind::File)
    }

    fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind(path, EntryKind::Directory)
    }

    fn close(&self) -> Result<(), StorageError> {
        if !self.mark_closed() || !self.root_deleted_on_close() {
            return Ok(());
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => return Err(err).context(io_context("Failed to delete root", &self.root)),
        }
        info!(path = %self.root.display(), "Provider root deleted on close");
        Ok(())
    }
}

/// `rename` replaces atomically on every supported platform; the fallback covers
/// filesystems that refuse to rename over an existing entry.
fn replace(temp: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(temp, target) {
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(target)?;
            fs::rename(temp, target)
        },
        other => other,
    }
}

fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp)
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %temp.display(), error = %err, "Failed to remove temp file");
    }
}

fn sync_dir(path: &Path) {
    match File::open(path) {
        Ok(dir) => {
            if let Err(err) = dir.sync_all() {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => warn!(path = %path.display(), error = %err, "Directory open failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> (tempfile::TempDir, FileSystemStorageProvider) {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        (tmp, FileSystemStorageProvider::from_parts(root, false))
    }

    #[test]
    fn create_new_never_clobbers() {
        let (_tmp, fs) = provider();
        fs.write_data("a.txt", FileMode::CreateNew, b"one").unwrap();
        assert!(matches!(
            fs.write_data("a.txt", FileMode::CreateNew, b"two"),
            Err(StorageError::AlreadyExists { .. })
        ));
        assert_eq!(fs.read_data("a.txt").unwrap(), b"one");
    }

    #[test]
    fn swap_leaves_no_temp_files() {
        let (tmp, fs) = provider();
        fs.write_data("a.txt", FileMode::Create, b"one").unwrap();
        fs.write_data("a.txt", FileMode::Create, b"two").unwrap();
        fs.copy_file("a.txt", "b.txt", false).unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "{names:?}");
    }

    #[test]
    fn append_extends_existing_content() {
        let (_tmp, fs) = provider();
        fs.write_data("log", FileMode::Append, b"ab").unwrap();
        fs.write_data("log", FileMode::Append, b"cd").unwrap();
        assert_eq!(fs.read_data("log").unwrap(), b"abcd");
    }

    #[test]
    fn the_root_cannot_be_deleted() {
        let (_tmp, fs) = provider();
        assert!(matches!(
            fs.delete_directory("/", true),
            Err(StorageError::InvalidArgument { .. })
        ));
        assert!(fs.directory_exists("").unwrap());
    }
}
