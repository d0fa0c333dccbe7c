use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Content-addressed store of artefacts already seen by this machine.
#[derive(Debug, Clone)]
pub struct ArtefactCache {
    root: PathBuf,
}

impl ArtefactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, sha256hex: &str) -> PathBuf {
        self.root.join("sha256").join(sha256hex)
    }

    pub fn contains(&self, sha256hex: &str) -> bool {
        self.path_for(sha256hex).is_file()
    }

    /// Store `file` under its hash. Existing entries are left untouched.
    pub fn copy_to_cache(&self, file: &Path, sha256hex: &str) -> Result<()> {
        let dest = self.path_for(sha256hex);
        if dest.exists() {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // write then rename so readers never see a partial entry
        let tmp = dest.with_extension(format!("tmp-{}", std::process::id()));
        std::fs::copy(file, &tmp)?;
        std::fs::rename(&tmp, &dest)?;
        debug!("cached {} as {}", file.display(), sha256hex);
        Ok(())
    }

    /// Copy the cached entry to `dest`. Returns `false` on a cache miss.
    pub fn get_file_from_cache(&self, dest: &Path, sha256hex: &str) -> Result<bool> {
        let src = self.path_for(sha256hex);
        if !src.is_file() {
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, dest)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));
        let src = tmp.path().join("a.txt");
        std::fs::write(&src, "hello").unwrap();

        let dest = tmp.path().join("out/nested/a.txt");
        assert!(!cache.get_file_from_cache(&dest, "abc").unwrap());

        cache.copy_to_cache(&src, "abc").unwrap();
        assert!(cache.contains("abc"));
        assert!(cache.get_file_from_cache(&dest, "abc").unwrap());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "hello");
    }

    #[test]
    fn test_existing_entry_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtefactCache::new(tmp.path());
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        std::fs::write(&a, "first").unwrap();
        std::fs::write(&b, "second").unwrap();
        cache.copy_to_cache(&a, "h").unwrap();
        cache.copy_to_cache(&b, "h").unwrap();
        assert_eq!(std::fs::read_to_string(cache.path_for("h")).unwrap(), "first");
    }
}
