//! File-backed persistent vector store.
//!
//! Records live in a single JSON file next to a manifest recording the
//! embedding model and dimensionality they were built with. The file is
//! written atomically (temp file + rename) and reloaded on later runs;
//! a rebuild replaces it wholesale. Builds take an advisory lock file so
//! only one writer can run against a store location at a time, while
//! searches are plain reads against the in-memory copy and stay safe
//! under concurrency.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::document::{ScoredChunk, StoreRecord};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank_records};

const STORE_FILE: &str = "store.json";
const LOCK_FILE: &str = ".build.lock";

/// Manifest persisted alongside the records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreManifest {
    /// Identifier of the embedding provider/model the vectors came from.
    pub embedding_model: String,
    /// Dimensionality shared by every vector in the store.
    pub dimensions: usize,
    /// Number of records at the time of the last write.
    pub records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    manifest: StoreManifest,
    records: Vec<StoreRecord>,
}

#[derive(Debug, Default)]
struct Attached {
    manifest: StoreManifest,
    records: Vec<StoreRecord>,
    by_id: HashMap<String, usize>,
}

impl Default for StoreManifest {
    fn default() -> Self {
        Self { embedding_model: String::new(), dimensions: 0, records: 0 }
    }
}

/// Advisory build lock: a `create_new` file held for the duration of a
/// rebuild and removed on drop.
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RagError::StoreError {
                    backend: "persistent".into(),
                    message: format!(
                        "another build is in progress (lock file {} exists)",
                        path.display()
                    ),
                })
            }
            Err(source) => Err(RagError::Io { path, source }),
        }
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A vector store persisted as JSON under a configured directory.
///
/// Construction has no filesystem effects; call
/// [`load`](PersistentVectorStore::load) to attach to an existing store
/// or [`rebuild`](PersistentVectorStore::rebuild) to create one.
#[derive(Debug)]
pub struct PersistentVectorStore {
    dir: PathBuf,
    inner: RwLock<Option<Attached>>,
}

impl PersistentVectorStore {
    /// Create a handle for the store at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), inner: RwLock::new(None) }
    }

    fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    /// Whether a persisted store exists at this location.
    pub fn exists(&self) -> bool {
        self.store_path().is_file()
    }

    /// The manifest of the attached store, if any.
    pub async fn manifest(&self) -> Option<StoreManifest> {
        self.inner.read().await.as_ref().map(|a| a.manifest.clone())
    }

    /// Attach to the persisted records at this location.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::StoreNotFound`] if no prior build exists here,
    /// or [`RagError::StoreError`] if the file cannot be parsed.
    pub async fn load(&self) -> Result<()> {
        let path = self.store_path();
        if !path.is_file() {
            return Err(RagError::StoreNotFound { path });
        }

        let file = fs::File::open(&path)
            .map_err(|source| RagError::Io { path: path.clone(), source })?;
        let parsed: StoreFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| RagError::StoreError {
                backend: "persistent".into(),
                message: format!("corrupted store at {}: {e}", path.display()),
            })?;

        info!(
            path = %path.display(),
            records = parsed.records.len(),
            model = %parsed.manifest.embedding_model,
            "loaded vector store"
        );

        let by_id =
            parsed.records.iter().enumerate().map(|(i, r)| (r.chunk_id.clone(), i)).collect();
        *self.inner.write().await = Some(Attached {
            manifest: parsed.manifest,
            records: parsed.records,
            by_id,
        });
        Ok(())
    }

    /// Replace the persisted store with freshly embedded records.
    ///
    /// Validates that all vectors share one dimensionality, takes the
    /// advisory build lock, writes atomically, and attaches the new data.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] on inconsistent vectors and
    /// [`RagError::StoreError`] if another build holds the lock.
    pub async fn rebuild(&self, embedding_model: &str, records: Vec<StoreRecord>) -> Result<()> {
        let dimensions = records.first().map(|r| r.vector.len()).unwrap_or(0);
        for record in &records {
            if record.vector.len() != dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: dimensions,
                    got: record.vector.len(),
                });
            }
        }

        fs::create_dir_all(&self.dir)
            .map_err(|source| RagError::Io { path: self.dir.clone(), source })?;
        let _lock = BuildLock::acquire(self.dir.join(LOCK_FILE))?;

        let manifest = StoreManifest {
            embedding_model: embedding_model.to_string(),
            dimensions,
            records: records.len(),
        };
        let by_id = records.iter().enumerate().map(|(i, r)| (r.chunk_id.clone(), i)).collect();
        let attached = Attached { manifest: manifest.clone(), records, by_id };

        self.write_file(&attached)?;
        info!(
            path = %self.store_path().display(),
            records = manifest.records,
            dimensions,
            "rebuilt vector store"
        );
        *self.inner.write().await = Some(attached);
        Ok(())
    }

    /// Warn when the attached store was built with a different embedding
    /// model than the one now configured.
    pub async fn check_model(&self, expected: &str) {
        if let Some(manifest) = self.manifest().await {
            if manifest.embedding_model != expected {
                warn!(
                    store_model = %manifest.embedding_model,
                    configured_model = %expected,
                    "store was built with a different embedding model; reindex to re-embed"
                );
            }
        }
    }

    fn write_file(&self, attached: &Attached) -> Result<()> {
        let path = self.store_path();
        let tmp = self.dir.join(format!("{STORE_FILE}.tmp"));

        let file = fs::File::create(&tmp)
            .map_err(|source| RagError::Io { path: tmp.clone(), source })?;
        let payload = StoreFile {
            manifest: StoreManifest {
                records: attached.records.len(),
                ..attached.manifest.clone()
            },
            records: attached.records.clone(),
        };
        serde_json::to_writer(BufWriter::new(file), &payload).map_err(|e| {
            RagError::StoreError {
                backend: "persistent".into(),
                message: format!("failed to serialize store: {e}"),
            }
        })?;
        fs::rename(&tmp, &path).map_err(|source| RagError::Io { path, source })?;
        Ok(())
    }

    async fn with_attached_mut<T>(
        &self,
        f: impl FnOnce(&mut Attached) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.inner.write().await;
        let attached = guard.as_mut().ok_or(RagError::StoreNotReady)?;
        let value = f(attached)?;
        self.write_file(attached)?;
        Ok(value)
    }
}

#[async_trait]
impl VectorStore for PersistentVectorStore {
    async fn upsert(&self, records: Vec<StoreRecord>) -> Result<()> {
        self.with_attached_mut(|attached| {
            for record in records {
                if attached.records.is_empty() && attached.by_id.is_empty() {
                    attached.manifest.dimensions = record.vector.len();
                }
                if record.vector.len() != attached.manifest.dimensions {
                    return Err(RagError::DimensionMismatch {
                        expected: attached.manifest.dimensions,
                        got: record.vector.len(),
                    });
                }
                match attached.by_id.get(&record.chunk_id) {
                    Some(&i) => attached.records[i] = record,
                    None => {
                        attached.by_id.insert(record.chunk_id.clone(), attached.records.len());
                        attached.records.push(record);
                    }
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.with_attached_mut(|attached| {
            let doomed: std::collections::HashSet<&String> = ids.iter().collect();
            attached.records.retain(|r| !doomed.contains(&r.chunk_id));
            attached.by_id = attached
                .records
                .iter()
                .enumerate()
                .map(|(i, r)| (r.chunk_id.clone(), i))
                .collect();
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredChunk>> {
        let guard = self.inner.read().await;
        let attached = guard.as_ref().ok_or(RagError::StoreNotReady)?;
        Ok(rank_records(&attached.records, vector, top_k, score_threshold))
    }

    async fn count(&self) -> usize {
        self.inner.read().await.as_ref().map(|a| a.records.len()).unwrap_or(0)
    }

    async fn is_ready(&self) -> bool {
        self.inner.read().await.is_some()
    }

    async fn clear(&self) -> Result<()> {
        self.with_attached_mut(|attached| {
            attached.records.clear();
            attached.by_id.clear();
            Ok(())
        })
        .await
    }
}
