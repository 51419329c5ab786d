use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

/// Walk `root` and collect candidate paths for checksum updates: regular
/// files and symlinks, minus anything matching an ignore glob. Directory
/// symlinks are not followed.
pub fn collect_files(root: &Path, ignore_globs: &[String]) -> Vec<PathBuf> {
    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(entry.path()))
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Error walking directory tree: {}", e);
                None
            }
        })
        .filter(|entry| {
            let file_type = entry.file_type();
            file_type.is_file() || file_type.is_symlink()
        })
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    #[test]
    fn collects_files_and_symlinks_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        File::create(dir.path().join("a")).unwrap().write_all(b"a").unwrap();
        File::create(sub.join("b")).unwrap().write_all(b"b").unwrap();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("lnk")).unwrap();

        let mut files = collect_files(dir.path(), &[]);
        files.sort();
        assert_eq!(files.len(), 3);
        assert!(files.contains(&dir.path().join("lnk")));
    }

    #[test]
    fn ignore_globs_prune_matches() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("keep.txt")).unwrap();
        File::create(dir.path().join("skip.tmp")).unwrap();

        let files = collect_files(dir.path(), &["*.tmp".to_string()]);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }
}
