use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::InterfaceError;

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Data(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct ChallengeFile {
    pub basename: String,
    source: Source,
    pub description: Option<String>,
}

/// Output files declared by a container, written out at the end of a phase.
#[derive(Debug, Default)]
pub struct FileSet {
    files: BTreeMap<String, ChallengeFile>,
}

fn check_valid_basename(basename: &str) -> Result<(), InterfaceError> {
    let path = Path::new(basename);
    let ok = !basename.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(InterfaceError::InvalidFile(format!(
            "Invalid file name {:?}: must be a relative path without \"..\"",
            basename
        )));
    }
    Ok(())
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn basenames(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn insert(&mut self, file: ChallengeFile) -> Result<(), InterfaceError> {
        check_valid_basename(&file.basename)?;
        if self.files.contains_key(&file.basename) {
            return Err(InterfaceError::InvalidFile(format!(
                "Already know {:?}",
                file.basename
            )));
        }
        self.files.insert(file.basename.clone(), file);
        Ok(())
    }

    pub fn add(
        &mut self,
        basename: &str,
        from_file: &Path,
        description: Option<&str>,
    ) -> Result<(), InterfaceError> {
        if !from_file.exists() {
            return Err(InterfaceError::InvalidFile(format!(
                "The file does not exist: {}",
                from_file.display()
            )));
        }
        self.insert(ChallengeFile {
            basename: basename.to_string(),
            source: Source::File(from_file.to_path_buf()),
            description: description.map(str::to_string),
        })
    }

    pub fn add_from_data(
        &mut self,
        basename: &str,
        contents: impl Into<Vec<u8>>,
        description: Option<&str>,
    ) -> Result<(), InterfaceError> {
        self.insert(ChallengeFile {
            basename: basename.to_string(),
            source: Source::Data(contents.into()),
            description: description.map(str::to_string),
        })
    }

    /// Materialize every file under `dest`.
    pub fn write(&self, dest: &Path) -> Result<(), InterfaceError> {
        for file in self.files.values() {
            let out = dest.join(&file.basename);
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match &file.source {
                Source::File(from) => {
                    std::fs::copy(from, &out)?;
                }
                Source::Data(data) => std::fs::write(&out, data)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_write() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.bin");
        std::fs::write(&src, b"abc").unwrap();

        let mut fs = FileSet::new();
        fs.add("sub/copied.bin", &src, Some("a copy")).unwrap();
        fs.add_from_data("data.txt", "hello", None).unwrap();
        assert_eq!(fs.basenames(), vec!["data.txt", "sub/copied.bin"]);

        let dest = tmp.path().join("out");
        fs.write(&dest).unwrap();
        assert_eq!(std::fs::read(dest.join("sub/copied.bin")).unwrap(), b"abc");
        assert_eq!(std::fs::read_to_string(dest.join("data.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut fs = FileSet::new();
        fs.add_from_data("a", "1", None).unwrap();
        let err = fs.add_from_data("a", "2", None).unwrap_err();
        assert!(err.to_string().contains("Already know"));
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn test_missing_source_rejected() {
        let mut fs = FileSet::new();
        let err = fs
            .add("a", Path::new("/nonexistent/dt/file"), None)
            .unwrap_err();
        assert!(matches!(err, InterfaceError::InvalidFile(_)));
        assert!(fs.is_empty());
    }

    #[test]
    fn test_escaping_basenames_rejected() {
        let mut fs = FileSet::new();
        assert!(fs.add_from_data("../evil", "x", None).is_err());
        assert!(fs.add_from_data("/etc/passwd", "x", None).is_err());
        assert!(fs.add_from_data("", "x", None).is_err());
    }
}
