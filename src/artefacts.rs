use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::ArtefactCache;
use crate::error::{EvaluatorError, Result};
use crate::layout::CHALLENGE_PREVIOUS_STEPS_DIR;
use crate::storage::ObjectStore;

pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".DS_Store"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Location {
    pub bucket_name: String,
    pub object_key: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Where an artefact can be fetched from. Empty when only cached locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Location>,
}

/// An artefact produced by an earlier step, as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtefactRef {
    pub sha256hex: String,
    pub size: u64,
    #[serde(default)]
    pub storage: Storage,
}

/// step name -> relative path -> artefact
pub type StepsArtefacts = BTreeMap<String, BTreeMap<String, ArtefactRef>>;

/// An artefact produced by this job, reported back to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtefactRecord {
    pub size: u64,
    pub mime_type: String,
    pub rpath: String,
    pub sha256hex: String,
    pub storage: Storage,
}

pub fn compute_sha256hex(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn guess_mime_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "yaml" | "yml" => "text/yaml",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "tar" => "application/x-tar",
        _ => "binary/octet-stream",
    };
    mime.to_string()
}

/// Human readable size, as printed in the transfer logs.
pub fn friendly_size(b: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if b == 0 {
        "empty".to_string()
    } else if b < KB {
        format!("{}  B", b)
    } else if b < MB {
        format!("{} KB", b.div_ceil(KB))
    } else if b < GB {
        format!("{} MB", b.div_ceil(MB))
    } else {
        format!("{:.2} GB", b as f64 / GB as f64)
    }
}

/// Files below `wd` to report, keyed by their path relative to `wd`.
///
/// Artefacts of previous steps are skipped since they are already known.
pub fn get_files_to_upload(wd: &Path, ignore_patterns: &[&str]) -> Result<BTreeMap<String, PathBuf>> {
    let mut out = BTreeMap::new();
    walk(wd, wd, ignore_patterns, &mut out)?;
    Ok(out)
}

fn walk(
    base: &Path,
    dir: &Path,
    ignore: &[&str],
    out: &mut BTreeMap<String, PathBuf>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(base, &path, ignore, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name();
        if ignore.iter().any(|p| name.to_str() == Some(*p)) {
            continue;
        }
        let rpath = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        if rpath.contains(CHALLENGE_PREVIOUS_STEPS_DIR) {
            continue;
        }
        out.insert(rpath, path);
    }
    Ok(())
}

/// Materialize the artefacts of previous steps under `dest/<step>/<rpath>`.
pub async fn download_artefacts(
    store: Option<&dyn ObjectStore>,
    cache: &ArtefactCache,
    steps2artefacts: &StepsArtefacts,
    dest: &Path,
) -> Result<()> {
    for (step_name, artefacts) in steps2artefacts {
        let step_dir = dest.join(step_name);
        tokio::fs::create_dir_all(&step_dir).await?;

        for (rpath, data) in artefacts {
            debug!("{:?}", data);
            let path = step_dir.join(rpath);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            if cache.get_file_from_cache(&path, &data.sha256hex)? {
                info!("cache   {:>7}   {}", friendly_size(data.size), rpath);
                continue;
            }

            let s3 = data.storage.s3.as_ref().ok_or_else(|| {
                EvaluatorError::CouldNotDownloadAll(format!(
                    "{} is not in cache and there is no way to download it",
                    rpath
                ))
            })?;
            let store = store.ok_or_else(|| {
                EvaluatorError::CouldNotDownloadAll(format!(
                    "{} is on S3 but no S3 configuration is available",
                    rpath
                ))
            })?;

            info!("AWS     {:>7}   {}", friendly_size(data.size), rpath);
            store
                .get_object(&s3.bucket_name, &s3.object_key, &path)
                .await?;

            let size_now = tokio::fs::metadata(&path).await?.len();
            if size_now != data.size {
                return Err(EvaluatorError::CorruptArtefact {
                    rpath: rpath.clone(),
                    path: path.display().to_string(),
                    expected: data.size,
                    found: size_now,
                });
            }
            cache.copy_to_cache(&path, &data.sha256hex)?;
        }
    }
    Ok(())
}

fn describe(rpath: &str, realfile: &Path, cache: &ArtefactCache) -> Result<(u64, String, String)> {
    let sha256hex = compute_sha256hex(realfile)?;
    cache.copy_to_cache(realfile, &sha256hex)?;
    let size = std::fs::metadata(realfile)?.len();
    debug!("{} -> {}", rpath, sha256hex);
    Ok((size, guess_mime_type(realfile), sha256hex))
}

/// Cache every output file and, when a store is given, upload the ones it
/// does not have yet.
pub async fn upload_files(
    wd: &Path,
    store: Option<&dyn ObjectStore>,
    cache: &ArtefactCache,
) -> Result<Vec<ArtefactRecord>> {
    let toupload = get_files_to_upload(wd, DEFAULT_IGNORE_PATTERNS)?;

    if store.is_none() {
        info!("Not uploading artefacts because AWS config not passed.");
    }

    let mut uploaded = Vec::with_capacity(toupload.len());
    for (rpath, realfile) in toupload {
        let (size, mime_type, sha256hex) = {
            let (rpath, realfile, cache) = (rpath.clone(), realfile.clone(), cache.clone());
            tokio::task::spawn_blocking(move || describe(&rpath, &realfile, &cache))
                .await
                .map_err(|e| EvaluatorError::Storage(format!("hashing task failed: {}", e)))??
        };

        let storage = match store {
            None => Storage::default(),
            Some(store) => {
                let object_key = store.object_key_for(&sha256hex);
                if store.exists(&object_key).await? {
                    info!("{:>15} {:>8}  {}", "known", friendly_size(size), rpath);
                } else {
                    info!("{:>15} {:>8}  {}", "uploading", friendly_size(size), rpath);
                    store.put_object(&object_key, &realfile, &mime_type).await?;
                }
                Storage {
                    s3: Some(S3Location {
                        bucket_name: store.bucket().to_string(),
                        url: Some(store.public_url(&object_key)),
                        object_key,
                    }),
                }
            }
        };

        uploaded.push(ArtefactRecord {
            size,
            mime_type,
            rpath,
            sha256hex,
            storage,
        });
    }
    Ok(uploaded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory object store.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
        pub puts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        fn bucket(&self) -> &str {
            "test-bucket"
        }

        fn path_by_value(&self) -> &str {
            "by-value"
        }

        async fn check_connection(&self) -> Result<()> {
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }

        async fn get_object(&self, _bucket: &str, key: &str, dest: &Path) -> Result<()> {
            let data = self
                .objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| EvaluatorError::Storage(format!("no such key {}", key)))?;
            std::fs::write(dest, data)?;
            Ok(())
        }

        async fn put_object(&self, key: &str, file: &Path, _content_type: &str) -> Result<()> {
            let data = std::fs::read(file)?;
            self.objects.lock().unwrap().insert(key.to_string(), data);
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    const HELLO_SHA: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_sha256() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("f");
        std::fs::write(&p, "hello").unwrap();
        assert_eq!(compute_sha256hex(&p).unwrap(), HELLO_SHA);
    }

    #[test]
    fn test_friendly_size() {
        assert_eq!(friendly_size(0), "empty");
        assert_eq!(friendly_size(10), "10  B");
        assert_eq!(friendly_size(1025), "2 KB");
        assert_eq!(friendly_size(3 * 1024 * 1024), "3 MB");
        assert_eq!(friendly_size(3 * 1024 * 1024 * 1024 / 2), "1.50 GB");
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("a/results.yaml")), "text/yaml");
        assert_eq!(guess_mime_type(Path::new("log-evaluator.html")), "text/html");
        assert_eq!(guess_mime_type(Path::new("video.MP4")), "video/mp4");
        assert_eq!(guess_mime_type(Path::new("blob")), "binary/octet-stream");
    }

    #[test]
    fn test_files_to_upload_skips_ignored_and_previous_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = tmp.path();
        std::fs::create_dir_all(wd.join("challenge-results")).unwrap();
        std::fs::create_dir_all(wd.join("previous-steps/step1")).unwrap();
        std::fs::write(wd.join("challenge-results/challenge_results.yaml"), "x").unwrap();
        std::fs::write(wd.join("previous-steps/step1/a.txt"), "x").unwrap();
        std::fs::write(wd.join(".DS_Store"), "x").unwrap();
        std::fs::write(wd.join("log-evaluator.txt"), "x").unwrap();

        let files = get_files_to_upload(wd, DEFAULT_IGNORE_PATTERNS).unwrap();
        let keys: Vec<_> = files.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "challenge-results/challenge_results.yaml".to_string(),
                "log-evaluator.txt".to_string()
            ]
        );
    }

    fn refs(storage: Storage, size: u64) -> StepsArtefacts {
        let mut step = BTreeMap::new();
        step.insert(
            "challenge-evaluation-output/out.txt".to_string(),
            ArtefactRef {
                sha256hex: HELLO_SHA.to_string(),
                size,
                storage,
            },
        );
        let mut all = BTreeMap::new();
        all.insert("step1".to_string(), step);
        all
    }

    fn s3_storage() -> Storage {
        Storage {
            s3: Some(S3Location {
                bucket_name: "test-bucket".into(),
                object_key: "by-value/sha256/hello".into(),
                url: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_download_from_store_then_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));
        let store = MemoryStore::default();
        store
            .objects
            .lock()
            .unwrap()
            .insert("by-value/sha256/hello".into(), b"hello".to_vec());

        let dest = tmp.path().join("previous-steps");
        download_artefacts(Some(&store), &cache, &refs(s3_storage(), 5), &dest)
            .await
            .unwrap();
        let out = dest.join("step1/challenge-evaluation-output/out.txt");
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello");
        assert!(cache.contains(HELLO_SHA));

        // second time: served from cache even without a store
        let dest2 = tmp.path().join("again");
        download_artefacts(None, &cache, &refs(s3_storage(), 5), &dest2)
            .await
            .unwrap();
        assert!(dest2.join("step1/challenge-evaluation-output/out.txt").exists());
    }

    #[tokio::test]
    async fn test_download_size_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));
        let store = MemoryStore::default();
        store
            .objects
            .lock()
            .unwrap()
            .insert("by-value/sha256/hello".into(), b"hello".to_vec());

        let err = tokio_test::assert_err!(
            download_artefacts(Some(&store), &cache, &refs(s3_storage(), 99), tmp.path()).await
        );
        assert!(matches!(err, EvaluatorError::CorruptArtefact { .. }));
        assert!(!cache.contains(HELLO_SHA));
    }

    #[tokio::test]
    async fn test_download_without_any_source() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));

        let err = download_artefacts(None, &cache, &refs(Storage::default(), 5), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::CouldNotDownloadAll(_)));

        let err = download_artefacts(None, &cache, &refs(s3_storage(), 5), tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::CouldNotDownloadAll(_)));
    }

    #[tokio::test]
    async fn test_upload_local_only() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = tmp.path().join("wd");
        std::fs::create_dir_all(&wd).unwrap();
        std::fs::write(wd.join("a.yaml"), "hello").unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));

        let records = upload_files(&wd, None, &cache).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rpath, "a.yaml");
        assert_eq!(records[0].mime_type, "text/yaml");
        assert_eq!(records[0].size, 5);
        assert_eq!(records[0].storage, Storage::default());
        assert!(cache.contains(HELLO_SHA));
    }

    #[tokio::test]
    async fn test_upload_skips_known_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let wd = tmp.path().join("wd");
        std::fs::create_dir_all(&wd).unwrap();
        std::fs::write(wd.join("a.txt"), "hello").unwrap();
        std::fs::write(wd.join("b.txt"), "other").unwrap();
        let cache = ArtefactCache::new(tmp.path().join("cache"));
        let store = MemoryStore::default();
        let known = format!("by-value/sha256/{}", HELLO_SHA);
        store
            .objects
            .lock()
            .unwrap()
            .insert(known.clone(), b"hello".to_vec());

        let records = upload_files(&wd, Some(&store), &cache).await.unwrap();
        assert_eq!(records.len(), 2);
        let s3 = records[0].storage.s3.as_ref().unwrap();
        assert_eq!(s3.object_key, known);
        assert_eq!(
            s3.url.as_deref(),
            Some(format!("http://test-bucket.s3.amazonaws.com/{}", known).as_str())
        );

        let puts = store.puts.lock().unwrap();
        assert_eq!(puts.len(), 1);
        assert_ne!(puts[0], known);
    }
}
