use crate::error::StorageError;
use crate::path;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Collapses `.` and `..` lexically, refusing to climb above the sandbox root.
fn collapse(relative: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();

    for component in relative.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                if !out.pop() {
                    return Err(StorageError::PathTraversalAttempt {
                        message: relative.display().to_string().into(),
                        context: Some("'..' climbs above the provider root".into()),
                    });
                }
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversalAttempt {
                    message: relative.display().to_string().into(),
                    context: Some("absolute path components are not allowed".into()),
                });
            },
        }
    }

    Ok(out)
}

/// Nothing lives at the path, either because it is missing or because one of its
/// ancestors is a regular file.
pub(super) fn is_absent(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}

/// Maps a provider path onto the physical filesystem below `root`.
///
/// Leading separators are ignored, so `/a/b` and `a/b` address the same entry. The
/// result never escapes `root`: `..` may not climb above it and an existing ancestor
/// may not be a symlink pointing outside it.
pub(crate) fn resolve(root: &Path, provider_path: &str) -> Result<PathBuf, StorageError> {
    let relative: PathBuf = path::segments(provider_path).collect();
    let joined = root.join(collapse(&relative)?);

    match joined.canonicalize() {
        Ok(canonical) => inside(root, canonical),
        Err(err) if is_absent(&err) => {
            check_nearest_ancestor(root, &joined)?;
            Ok(joined)
        },
        Err(err) => Err(StorageError::Io {
            source: err,
            context: Some(format!("Failed to resolve {}", joined.display()).into()),
        }),
    }
}

fn inside(root: &Path, canonical: PathBuf) -> Result<PathBuf, StorageError> {
    if canonical.starts_with(root) {
        Ok(canonical)
    } else {
        Err(StorageError::PathTraversalAttempt {
            message: canonical.display().to_string().into(),
            context: Some("entry resolves outside the provider root".into()),
        })
    }
}

/// For a path that does not exist yet: the closest existing ancestor must still
/// canonicalize to somewhere inside `root`.
fn check_nearest_ancestor(root: &Path, joined: &Path) -> Result<(), StorageError> {
    for ancestor in joined.ancestors() {
        if ancestor == root {
            return Ok(());
        }
        if !ancestor.starts_with(root) {
            break;
        }
        match ancestor.canonicalize() {
            Ok(canonical) => return inside(root, canonical).map(|_| ()),
            Err(err) if is_absent(&err) => {},
            Err(err) => {
                return Err(StorageError::Io {
                    source: err,
                    context: Some("Failed to verify parent directory".into()),
                });
            },
        }
    }

    Err(StorageError::PathTraversalAttempt {
        message: joined.display().to_string().into(),
        context: Some("no ancestor inside the provider root".into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn climbing_out_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        assert!(matches!(
            resolve(&root, "../etc/passwd"),
            Err(StorageError::PathTraversalAttempt { .. })
        ));
        assert!(resolve(&root, r"a\..\..\b").is_err());
    }

    #[test]
    fn inner_dot_dot_and_leading_slashes_are_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        assert_eq!(resolve(&root, "a/../b.txt").unwrap(), root.join("b.txt"));
        assert_eq!(resolve(&root, "/x/y").unwrap(), root.join("x").join("y"));
        assert_eq!(resolve(&root, "").unwrap(), root);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ancestor_outside_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(outside.path(), root.join("escape")).unwrap();
        assert!(matches!(
            resolve(&root, "escape/new.bin"),
            Err(StorageError::PathTraversalAttempt { .. })
        ));
    }

    #[test]
    fn paths_below_a_regular_file_resolve_as_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        std::fs::write(root.join("file"), b"x").unwrap();
        assert_eq!(resolve(&root, "file/a.txt").unwrap(), root.join("file").join("a.txt"));
        assert_eq!(resolve(&root, "file/a/b").unwrap(), root.join("file").join("a").join("b"));
    }
}
