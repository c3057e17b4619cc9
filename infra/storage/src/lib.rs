//! Uniform, path-based file storage over heterogeneous backends.
//!
//! Every backend speaks the same [`StorageProvider`] (blocking) and
//! [`AsyncStorageProvider`] surface: write modes, directory management, move and copy,
//! listings and byte streams. Paths are slash-delimited and relative to the provider
//! root; a `\` from callers is accepted.
//!
//! # Backends
//!
//! - **[`FileSystemStorageProvider`]**: a sandboxed directory on local disk. Writes are
//!   atomic (unique temp file + `fsync` + `rename`) and stale temp files are purged on
//!   connect.
//! - **[`FtpStorageProvider`]**: an FTP(S) server driven through a pluggable
//!   [`FtpClient`], optionally scoped to a server directory.
//! - **[`TreeStorageProvider`]**: a remote store addressing nodes by opaque ids
//!   (a [`NodeBackend`]). Paths resolve against a TTL-bounded, single-flight
//!   [`NodeTreeCache`].
//!
//! # Streams
//!
//! [`Stream`] reports its capabilities (`can_read`, `can_seek`, ...) instead of
//! failing late. [`ConcatenatedStream`], [`MultiStream`] and
//! [`BufferedEnumerableStream`] compose streams and chunk producers.
//!
//! # Examples
//!
//! ```rust
//! use depot_storage::{AsyncStorageProvider, FileMode, FileSystemStorageProvider, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StorageError> {
//!     # let tmp = tempfile::tempdir().unwrap();
//!     # let root = tmp.path().join("data");
//!     let provider = FileSystemStorageProvider::builder()
//!         .root(&root)
//!         .create(true)
//!         .connect()
//!         .await?;
//!
//!     provider.create_directory("invoices").await?;
//!     provider.write_data("invoices/2024-01.pdf", FileMode::CreateNew, b"%PDF").await?;
//!
//!     let data = provider.read_data(r"invoices\2024-01.pdf").await?;
//!     assert_eq!(data, b"%PDF");
//!     assert_eq!(provider.list_files("invoices").await?, ["invoices/2024-01.pdf"]);
//!     Ok(())
//! }
//! ```
//!
//! Settings can come from a file with environment overrides:
//!
//! ```rust,no_run
//! # use depot_storage::{DepotConfig, FileSystemProviderBuilder, StorageError, load_config};
//! # async fn run() -> Result<(), StorageError> {
//! let config: DepotConfig = load_config("config/depot.toml")?;
//! let provider = FileSystemProviderBuilder::from_config(&config.filesystem).connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
mod mode;
mod node;
pub mod path;
pub mod provider;
pub mod stream;
pub mod tree;

pub use config::{DepotConfig, load_config};
pub use error::{StorageError, StorageErrorExt};
pub use mode::FileMode;
pub use node::{Node, NodeId, NodeKind};
pub use provider::filesystem::FileSystemProviderBuilder;
pub use provider::ftp::FtpEntry;
pub use provider::tree::{MemoryNodeBackend, NodeBackend, TreeProviderBuilder};
pub use provider::{
    AsyncStorageProvider, EntryKind, FileSystemStorageProvider, FtpClient, FtpStorageProvider,
    StorageProvider, TreeStorageProvider, UploadStream,
};
pub use stream::{
    BufferedEnumerableStream, ConcatenatedStream, FileStream, MemoryStream, MultiStream,
    SharedStream, Stream,
};
pub use tree::{NodeSource, NodeTreeCache, RootScope, Snapshot};
