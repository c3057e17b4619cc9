use super::{FileSystemStorageProvider, entry_kind, io_context, listing, listing_name, parent_label};
use super::sandbox::is_absent;
use crate::error::{StorageError, StorageErrorExt};
use crate::mode::FileMode;
use crate::provider::{AsyncStorageProvider, EntryKind, rules};
use crate::stream::{FileStream, Stream};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Where the bytes of an async write come from.
enum Payload<'a> {
    Bytes(&'a [u8]),
    Reader(&'a mut (dyn AsyncRead + Unpin + Send)),
    Copy(&'a Path),
}

impl Payload<'_> {
    async fn pour(self, file: &mut fs::File) -> io::Result<u64> {
        match self {
            Self::Bytes(data) => {
                file.write_all(data).await?;
                Ok(data.len() as u64)
            },
            Self::Reader(reader) => tokio::io::copy(reader, file).await,
            Self::Copy(source) => {
                let mut source = fs::File::open(source).await?;
                tokio::io::copy(&mut source, file).await
            },
        }
    }
}

impl FileSystemStorageProvider {
    async fn probe_async(path: &Path) -> Result<Option<EntryKind>, StorageError> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(Some(entry_kind(&meta))),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) => Err(err).context(io_context("Failed to inspect", path)),
        }
    }

    async fn require_parent_async(path: &str, target: &Path) -> Result<(), StorageError> {
        let found = match target.parent() {
            Some(parent) => Self::probe_async(parent).await?,
            None => Some(EntryKind::Directory),
        };
        rules::require_directory(&parent_label(path), found)
    }

    async fn swap_async(
        &self,
        target: &Path,
        mode: FileMode,
        payload: Payload<'_>,
    ) -> Result<u64, StorageError> {
        let temp = self.tmp_path(target);

        let written = async {
            let mut file = fs::OpenOptions::new().write(true).create_new(true).open(&temp).await?;
            let written = payload.pour(&mut file).await?;
            file.sync_all().await?;
            Ok::<_, io::Error>(written)
        }
        .await;
        let written = match written {
            Ok(written) => written,
            Err(err) => {
                discard(&temp).await;
                return Err(err).context(io_context("Temp write failed", &temp));
            },
        };

        let committed = if mode == FileMode::CreateNew {
            match fs::hard_link(&temp, target).await {
                Ok(()) => {
                    discard(&temp).await;
                    Ok(())
                },
                Err(err) => Err(err),
            }
        } else {
            replace(&temp, target).await
        };
        if let Err(err) = committed {
            discard(&temp).await;
            if err.kind() == io::ErrorKind::AlreadyExists {
                return Err(StorageError::already_exists(target.display().to_string()));
            }
            return Err(err).context(io_context("Atomic swap failed", target));
        }

        if let Some(parent) = target.parent() {
            sync_dir(parent).await;
        }
        debug!(path = %target.display(), bytes = written, "File saved atomically");
        Ok(written)
    }

    async fn write_payload(
        &self,
        path: &str,
        mode: FileMode,
        payload: Payload<'_>,
    ) -> Result<u64, StorageError> {
        let target = self.resolve(path)?;
        let mode = rules::check_write(path, mode, Self::probe_async(&target).await?)?;
        Self::require_parent_async(path, &target).await?;

        if mode != FileMode::Append {
            return self.swap_async(&target, mode, payload).await;
        }

        let mut file = fs::OpenOptions::from(mode.open_options())
            .open(&target)
            .await
            .context(io_context("Failed to open", &target))?;
        let written = payload.pour(&mut file).await.context(io_context("Append failed", &target))?;
        file.sync_all().await.context(io_context("Hardware sync failed", &target))?;
        debug!(path = %target.display(), bytes = written, "Data appended");
        Ok(written)
    }

    async fn list_kind_async(&self, path: &str, wanted: EntryKind) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(path)?;
        rules::require_directory(path, Self::probe_async(&dir).await?)?;

        let mut entries = fs::read_dir(&dir).await.context(io_context("Failed to list", &dir))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(io_context("Failed to list", &dir))? {
            let kind = match fs::metadata(entry.path()).await {
                Ok(meta) => entry_kind(&meta),
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

    async fn relocate_async(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
        keep_source: bool,
    ) -> Result<(), StorageError> {
        let source = self.resolve(path)?;
        rules::require_file(path, Self::probe_async(&source).await?)?;
        let target = self.resolve(new_path)?;
        let replace = rules::check_destination(new_path, Self::probe_async(&target).await?, overwrite)?;
        Self::require_parent_async(new_path, &target).await?;

        let mode = if replace { FileMode::Create } else { FileMode::CreateNew };
        if keep_source {
            self.swap_async(&target, mode, Payload::Copy(&source)).await?;
            debug!(from = %source.display(), to = %target.display(), "File copied");
            return Ok(());
        }

        let moved = if replace {
            fs::rename(&source, &target).await
        } else {
            match fs::hard_link(&source, &target).await {
                Ok(()) => fs::remove_file(&source).await,
                Err(err) => Err(err),
            }
        };
        moved.map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                StorageError::already_exists(new_path.to_owned())
            } else {
                StorageError::Io { source: err, context: Some(io_context("Move failed", &source).into()) }
            }
        })?;
        if let Some(parent) = target.parent() {
            sync_dir(parent).await;
        }
        debug!(from = %source.display(), to = %target.display(), "File moved");
        Ok(())
    }
}

#[async_trait]
impl AsyncStorageProvider for FileSystemStorageProvider {
    fn provider(&self) -> &'static str {
        Self::NAME
    }

    fn root(&self) -> Option<&str> {
        Some(self.display_root())
    }

    fn prepare_path(&self, path: &str) -> Result<String, StorageError> {
        self.resolve(path).map(|resolved| resolved.display().to_string())
    }

    async fn write_data(&self, path: &str, mode: FileMode, data: &[u8]) -> Result<(), StorageError> {
        self.write_payload(path, mode, Payload::Bytes(data)).await.map(|_| ())
    }

    async fn write_from(
        &self,
        path: &str,
        mode: FileMode,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64, StorageError> {
        self.write_payload(path, mode, Payload::Reader(source)).await
    }

    async fn read_stream(&self, path: &str) -> Result<Box<dyn Stream>, StorageError> {
        let resolved = self.resolve(path)?;
        rules::require_file(path, Self::probe_async(&resolved).await?)?;
        let file = fs::File::open(&resolved).await.context(io_context("Failed to open", &resolved))?;
        Ok(Box::new(FileStream::reader(file.into_std().await)))
    }

    async fn write_stream(
        &self,
        path: &str,
        mode: FileMode,
    ) -> Result<Box<dyn Stream>, StorageError> {
        let target = self.resolve(path)?;
        let mode = rules::check_write(path, mode, Self::probe_async(&target).await?)?;
        Self::require_parent_async(path, &target).await?;
        let file = match fs::OpenOptions::from(mode.open_options()).open(&target).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StorageError::already_exists(path.to_owned()));
            },
            Err(err) => return Err(err).context(io_context("Failed to open", &target)),
        };
        Ok(Box::new(FileStream::writer(file.into_std().await)))
    }

    async fn delete_directory(&self, path: &str, recursive: bool) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        if self.is_root_dir(&dir) {
            return Err(StorageError::invalid_argument("the provider root cannot be deleted"));
        }
        rules::require_directory(path, Self::probe_async(&dir).await?)?;

        if recursive {
            fs::remove_dir_all(&dir).await.context(io_context("Failed to delete", &dir))?;
        } else {
            let mut entries = fs::read_dir(&dir).await.context(io_context("Failed to list", &dir))?;
            if entries.next_entry().await.context(io_context("Failed to list", &dir))?.is_some() {
                return Ok(false);
            }
            fs::remove_dir(&dir).await.context(io_context("Failed to delete", &dir))?;
        }
        debug!(path = %dir.display(), recursive, "Directory deleted");
        Ok(true)
    }

    async fn create_directory(&self, path: &str) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        if !rules::check_create_directory(path, Self::probe_async(&dir).await?)? {
            return Ok(false);
        }
        Self::require_parent_async(path, &dir).await?;
        match fs::create_dir(&dir).await {
            Ok(()) => {
                debug!(path = %dir.display(), "Directory created");
                Ok(true)
            },
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                rules::check_create_directory(path, Self::probe_async(&dir).await?)
            },
            Err(err) => Err(err).context(io_context("Failed to create", &dir)),
        }
    }

    async fn directory_exists(&self, path: &str) -> Result<bool, StorageError> {
        let dir = self.resolve(path)?;
        Ok(Self::probe_async(&dir).await? == Some(EntryKind::Directory))
    }

    async fn move_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        self.relocate_async(path, new_path, overwrite, false).await
    }

    async fn copy_file(
        &self,
        path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), StorageError> {
        self.relocate_async(path, new_path, overwrite, true).await
    }

    async fn delete_file(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.resolve(path)?;
        rules::require_file(path, Self::probe_async(&file).await?)?;
        fs::remove_file(&file).await.context(io_context("Failed to delete", &file))?;
        debug!(path = %file.display(), "File deleted");
        Ok(true)
    }

    async fn file_exists(&self, path: &str) -> Result<bool, StorageError> {
        let file = self.resolve(path)?;
        Ok(Self::probe_async(&file).await? == Some(EntryKind::File))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind_async(path, EntryKind::File).await
    }

    async fn list_directories(&self, path: &str) -> Result<Vec<String>, StorageError> {
        self.list_kind_async(path, EntryKind::Directory).await
    }

    async fn close(&self) -> Result<(), StorageError> {
        if !self.mark_closed() || !self.root_deleted_on_close() {
            return Ok(());
        }
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => return Err(err).context(io_context("Failed to delete root", &self.root)),
        }
        info!(path = %self.root.display(), "Provider root deleted on close");
        Ok(())
    }
}

async fn replace(temp: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(temp, target).await {
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            fs::remove_file(target).await?;
            fs::rename(temp, target).await
        },
        other => other,
    }
}

async fn discard(temp: &Path) {
    if let Err(err) = fs::remove_file(temp).await
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %temp.display(), error = %err, "Failed to remove temp file");
    }
}

async fn sync_dir(path: &Path) {
    match fs::File::open(path).await {
        Ok(dir) => {
            if let Err(err) = dir.sync_all().await {
                warn!(path = %path.display(), error = %err, "Directory sync failed");
            }
        },
        Err(err) => warn!(path = %path.display(), error = %err, "Directory open failed"),
    }
}
