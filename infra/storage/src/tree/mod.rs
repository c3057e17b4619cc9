//! Cached, path-addressable views over tree-structured backends.
//!
//! A backend exposes nodes addressed by opaque ids. [`NodeTreeCache`] keeps a
//! time-bounded [`Snapshot`] of them and [`resolve`] turns slash-delimited paths into
//! nodes against that snapshot.

mod cache;
mod resolver;
mod snapshot;
mod source;

pub use cache::{DEFAULT_TTL, NodeTreeCache, RootScope};
pub use resolver::{find_root, resolve};
pub use snapshot::Snapshot;
pub use source::NodeSource;
