//! Semantic retrieval over an embedded document store.
//!
//! Records live in `entries.jsonl` under the index data directory, one JSON
//! object per line, rewritten through a tmp-file + rename on every persist.
//! Upsert is keyed by `source`: all records
//! sharing a source are dropped before the new ones go in, so re-processing
//! a document can never accumulate duplicate or stale vectors.

pub mod embedder;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use notegarden_config::IndexConfig;

pub use embedder::{Embedder, build_embedder};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend error ({status}): {body}")]
    Backend { status: String, body: String },

    #[error("malformed embedding reply: {0}")]
    MalformedReply(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A document snapshot queued for indexing.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub text: String,
    /// Bare filename; the upsert/delete key.
    pub source: String,
    /// Absolute path, carried as metadata for presentation.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    source: String,
    path: String,
    text: String,
    embedding: Vec<f32>,
}

/// One nearest-neighbour result, best first.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub source: String,
    pub path: String,
    pub text: String,
    pub score: f32,
}

pub struct SemanticIndex {
    embedder: Box<dyn Embedder>,
    data_dir: PathBuf,
    records: Vec<IndexRecord>,
}

impl SemanticIndex {
    /// Open the on-disk store, starting empty when none exists yet.
    /// Unreadable lines are skipped with a warning rather than failing the
    /// whole store.
    pub fn open(config: &IndexConfig, embedder: Box<dyn Embedder>) -> Result<Self, IndexError> {
        let data_dir = PathBuf::from(&config.data_dir);
        let mut index = Self {
            embedder,
            data_dir,
            records: Vec::new(),
        };
        index.load()?;
        Ok(index)
    }

    fn entries_path(&self) -> PathBuf {
        self.data_dir.join("entries.jsonl")
    }

    fn load(&mut self) -> Result<(), IndexError> {
        let path = self.entries_path();
        if !path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(&path)?;
        for line in raw.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<IndexRecord>(line) {
                Ok(record) => self.records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable index record");
                }
            }
        }
        debug!(entries = self.records.len(), "semantic index loaded");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replace-then-insert.  For every distinct source in `entries`, existing
    /// records with that source are dropped first, making repeated upserts of
    /// the same document idempotent.
    pub async fn upsert(&mut self, entries: Vec<NewEntry>) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }

        let sources: BTreeSet<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        self.records
            .retain(|record| !sources.contains(record.source.as_str()));

        for entry in entries {
            let embedding = self.embedder.embed(&entry.text).await?;
            self.records.push(IndexRecord {
                source: entry.source,
                path: entry.path,
                text: entry.text,
                embedding,
            });
        }

        self.persist()
    }

    /// K-nearest-neighbour search by cosine similarity, best match first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query).await?;

        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .map(|record| SearchHit {
                source: record.source.clone(),
                path: record.path.clone(),
                text: record.text.clone(),
                score: cosine_similarity(&record.embedding, &query_vec),
            })
            .collect();

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(k);
        Ok(hits)
    }

    /// Destroy and recreate the store.  Tolerates the store not existing.
    pub fn reset(&mut self) -> Result<(), IndexError> {
        if self.data_dir.exists() {
            fs::remove_dir_all(&self.data_dir)?;
        }
        self.records.clear();
        info!(path = %self.data_dir.display(), "semantic index reset");
        Ok(())
    }

    /// Rewrite the whole store atomically: write a `.tmp` sibling, then
    /// rename over the original.
    fn persist(&self) -> Result<(), IndexError> {
        fs::create_dir_all(&self.data_dir)?;

        let path = self.entries_path();
        let tmp_path = path.with_file_name("entries.jsonl.tmp");

        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }

        if let Err(err) = fs::write(&tmp_path, out) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
}

// ── Tests ────────────────────────────────────────────────────────────────────
