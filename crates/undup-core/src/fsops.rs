//! Filesystem collaborators for the index: hard links, symlinks, and the
//! sweep-time file moves. All link operations replace an existing
//! destination, and hard linking two paths that already share an inode is a
//! no-op.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Create the destination's parent directories if missing.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    if path.symlink_metadata().is_ok() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn same_inode(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(fs::metadata(a)?.ino() == fs::metadata(b)?.ino())
}

/// Hard link `link` to `target`. Both must be on the same filesystem. If the
/// two paths already share an inode this is a no-op.
pub fn hard_link(target: &Path, link: &Path) -> io::Result<()> {
    if !target.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("link target {} does not exist", target.display()),
        ));
    }
    if link.exists() && same_inode(target, link)? {
        return Ok(());
    }
    ensure_parent(link)?;
    remove_if_present(link)?;
    info!("Linking {} to {}", link.display(), target.display());
    fs::hard_link(target, link)
}

/// Symlink `link` to `target`, replacing any existing file at `link`.
pub fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    if !target.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("symlink target {} does not exist", target.display()),
        ));
    }
    ensure_parent(link)?;
    remove_if_present(link)?;
    info!("Symlinking {} to {}", link.display(), target.display());
    std::os::unix::fs::symlink(target, link)
}

/// Move `src` to `dst`, creating `dst`'s parents. When `rm_empty_dirs` is
/// set, removes `src`'s parent directory afterwards if the move emptied it.
pub fn move_file(src: &Path, dst: &Path, rm_empty_dirs: bool) -> io::Result<()> {
    ensure_parent(dst)?;
    info!("Moving {} to {}", src.display(), dst.display());
    fs::rename(src, dst)?;

    if rm_empty_dirs {
        if let Some(parent) = src.parent() {
            if parent.exists() && fs::read_dir(parent)?.next().is_none() {
                fs::remove_dir(parent)?;
            }
        }
    }
    Ok(())
}

/// Destination for `src` under `dstdir`, keeping the part of `src`'s
/// directory structure not shared with `dstdir`. Stripping the common prefix
/// turns `/data/photos/x.jpg` moved into `/data/dups` into
/// `/data/dups/photos/x.jpg`.
pub fn dst_with_subdirectory(src: &Path, dstdir: &Path) -> io::Result<PathBuf> {
    let src = absolute(src)?;
    let dstdir = absolute(dstdir)?;

    let src_parts: Vec<Component> = src.components().collect();
    let dst_parts: Vec<Component> = dstdir.components().collect();
    let common = src_parts
        .iter()
        .zip(dst_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut dst = dstdir.clone();
    for part in &src_parts[common..] {
        dst.push(part);
    }

    if dst == src {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "unable to determine new destination; {} and {} are the same path",
                dst.display(),
                src.display()
            ),
        ));
    }
    Ok(dst)
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn dst_keeps_uncommon_subdirectories() {
        let dst =
            dst_with_subdirectory(Path::new("/data/photos/2021/x.jpg"), Path::new("/data/dups"))
                .unwrap();
        assert_eq!(dst, PathBuf::from("/data/dups/photos/2021/x.jpg"));
    }

    #[test]
    fn dst_rejects_identical_paths() {
        let err = dst_with_subdirectory(Path::new("/data/x.jpg"), Path::new("/data"));
        assert!(err.is_err());
    }

    #[test]
    fn hard_link_is_noop_for_same_inode() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        File::create(&a).unwrap().write_all(b"x").unwrap();
        fs::hard_link(&a, &b).unwrap();

        hard_link(&a, &b).unwrap();
        assert!(same_inode(&a, &b).unwrap());
    }

    #[test]
    fn hard_link_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        File::create(&a).unwrap().write_all(b"x").unwrap();
        File::create(&b).unwrap().write_all(b"y").unwrap();
        assert!(!same_inode(&a, &b).unwrap());

        hard_link(&a, &b).unwrap();
        assert!(same_inode(&a, &b).unwrap());
        assert_eq!(fs::read(&b).unwrap(), b"x");
    }

    #[test]
    fn move_file_removes_emptied_parent() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let src = sub.join("f");
        File::create(&src).unwrap().write_all(b"x").unwrap();
        let dst = dir.path().join("moved/f");

        move_file(&src, &dst, true).unwrap();
        assert!(dst.exists());
        assert!(!sub.exists());
    }
}
