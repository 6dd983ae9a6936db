//! Directory walking shared by the filesystem collaborators

use std::io;
use std::path::{Path, PathBuf};

/// Regular file found under a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WalkedFile {
    /// Relative key, `/`-separated
    pub(crate) key: String,
    pub(crate) size: u64,
}

/// Every regular file under `root`, sorted by key
///
/// Symlinks are not followed. A name that is not valid UTF-8 cannot be
/// turned into a key and fails the walk with [`io::ErrorKind::InvalidData`].
pub(crate) async fn walk(root: &Path) -> io::Result<Vec<WalkedFile>> {
    let mut files = Vec::new();
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().into_string().map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("file name is not valid UTF-8: {}", entry.path().display()),
                )
            })?;
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push((entry.path(), key));
            } else if file_type.is_file() {
                let size = entry.metadata().await?.len();
                files.push(WalkedFile { key, size });
            }
        }
    }

    files.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(files)
}

/// Path of `key` under `root`
pub(crate) fn key_path(root: &Path, key: &str) -> PathBuf {
    key.split('/').fold(root.to_path_buf(), |path, part| path.join(part))
}

/// Clear the way for a file at `key` under `root` and return its path
///
/// A file sitting where one of the key's parent directories must go is
/// removed, and so is a directory sitting on the key itself.
pub(crate) async fn make_room(root: &Path, key: &str) -> io::Result<PathBuf> {
    let target = key_path(root, key);
    let mut path = root.to_path_buf();
    let mut parts = key.split('/').peekable();

    while let Some(part) = parts.next() {
        path.push(part);
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e),
        };
        if parts.peek().is_some() {
            if !meta.is_dir() {
                tokio::fs::remove_file(&path).await?;
                break;
            }
        } else if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        }
    }
    Ok(target)
}

/// Copy `from` to `to`, creating parent directories
pub(crate) async fn copy_file(from: &Path, to: &Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await
}

/// Remove a file; a file that is already gone is fine
pub(crate) async fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Whether `path` is an existing directory
pub(crate) async fn is_dir(path: &Path) -> io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn walk_uses_slash_keys_and_sorts() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("region/0")).await.unwrap();
        tokio::fs::write(dir.path().join("save.dat"), b"abcd").await.unwrap();
        tokio::fs::write(dir.path().join("region/0/chunk.bin"), b"xy").await.unwrap();

        let files = walk(dir.path()).await.unwrap();
        assert_eq!(
            files,
            vec![
                WalkedFile { key: "region/0/chunk.bin".into(), size: 2 },
                WalkedFile { key: "save.dat".into(), size: 4 },
            ]
        );
    }

    #[tokio::test]
    async fn remove_missing_file_is_ok() {
        let dir = TempDir::new().unwrap();
        remove_file_if_exists(&dir.path().join("ghost")).await.unwrap();
        assert!(!is_dir(&dir.path().join("ghost")).await.unwrap());
    }

    #[tokio::test]
    async fn make_room_clears_file_on_parent_path() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("region"), b"old").await.unwrap();

        let target = make_room(dir.path(), "region/chunk.bin").await.unwrap();
        assert_eq!(target, dir.path().join("region").join("chunk.bin"));
        assert!(!dir.path().join("region").exists());

        tokio::fs::write(dir.path().join("src.bin"), b"chunk").await.unwrap();
        assert_eq!(copy_file(&dir.path().join("src.bin"), &target).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn make_room_clears_directory_on_key() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("region/0")).await.unwrap();
        tokio::fs::write(dir.path().join("region/0/chunk.bin"), b"x").await.unwrap();

        let target = make_room(dir.path(), "region").await.unwrap();
        assert!(!target.exists());
        tokio::fs::write(&target, b"file now").await.unwrap();
    }

    #[tokio::test]
    async fn make_room_keeps_unrelated_entries() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("region")).await.unwrap();
        tokio::fs::write(dir.path().join("region/a.bin"), b"a").await.unwrap();

        make_room(dir.path(), "region/b.bin").await.unwrap();
        assert!(dir.path().join("region/a.bin").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn walk_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let bad = dir.path().join(OsStr::from_bytes(b"bad\xffname"));
        tokio::fs::write(&bad, b"x").await.unwrap();

        let err = walk(dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn key_path_splits_on_slash() {
        let path = key_path(Path::new("/r"), "a/b/c.txt");
        assert_eq!(path, Path::new("/r").join("a").join("b").join("c.txt"));
    }
}
