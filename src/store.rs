//! Directory-backed vector index: chunks, their hierarchy metadata and
//! embeddings in a single SQLite file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};
use crate::model::{Chunk, ChunkMetadata};
use crate::semantic::{cosine_similarity, decode_embedding_blob, encode_embedding_blob};
use crate::util::{now_utc_string, sha256_text};

pub const INDEX_SCHEMA_VERSION: &str = "1.0.0";
pub const INDEX_FILE_NAME: &str = "rag_index.sqlite";

#[derive(Debug, Clone, Default)]
pub struct IndexMetadata {
    pub schema_version: Option<String>,
    pub embed_model: Option<String>,
    pub source_sha256: Option<String>,
    pub built_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub similarity: f64,
}

/// The store serializes every statement through one connection, so inserts
/// from several indexing workers are safe without outside locking.
pub struct VectorStore {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl VectorStore {
    /// Drops any existing index in `index_dir` and creates an empty one bound
    /// to `embed_model`.
    pub fn recreate(index_dir: &Path, embed_model: &str, source_sha256: &str) -> Result<Self> {
        fs::create_dir_all(index_dir)?;
        let path = index_dir.join(INDEX_FILE_NAME);
        for suffix in ["", "-wal", "-shm"] {
            let candidate = PathBuf::from(format!("{}{suffix}", path.display()));
            match fs::remove_file(&candidate) {
                Ok(()) => info!(path = %candidate.display(), "removed previous index file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }

        let connection = Connection::open(&path)?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        let built_at = now_utc_string();
        for (key, value) in [
            ("schema_version", INDEX_SCHEMA_VERSION),
            ("embed_model", embed_model),
            ("source_sha256", source_sha256),
            ("built_at", built_at.as_str()),
        ] {
            connection.execute(
                "INSERT OR REPLACE INTO metadata(key, value) VALUES(?1, ?2)",
                params![key, value],
            )?;
        }

        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    /// Opens a previously built index. With `expected_model`, the index must
    /// have been built by that embedding model.
    pub fn open_existing(index_dir: &Path, expected_model: Option<&str>) -> Result<Self> {
        let path = index_dir.join(INDEX_FILE_NAME);
        if !path.is_file() {
            return Err(RagError::Configuration(format!(
                "vector index not found at {}; run ingest first",
                path.display()
            )));
        }

        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        configure_connection(&connection)?;
        let store = Self {
            connection: Mutex::new(connection),
            path,
        };

        let metadata = store.metadata()?;
        if metadata.schema_version.as_deref() != Some(INDEX_SCHEMA_VERSION) {
            return Err(RagError::Configuration(format!(
                "vector index {} has schema {:?}, expected {INDEX_SCHEMA_VERSION}; re-run ingest",
                store.path.display(),
                metadata.schema_version
            )));
        }
        if let Some(expected) = expected_model {
            if metadata.embed_model.as_deref() != Some(expected) {
                return Err(RagError::Configuration(format!(
                    "vector index was built with embedding model {:?} but {expected:?} is configured; re-run ingest",
                    metadata.embed_model
                )));
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts one batch atomically: either every chunk lands or none does.
    /// Returns the number of new rows; a chunk repeating an indexed chunk of
    /// the same page is skipped.
    pub fn insert_batch(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::Embedding(format!(
                "received {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut connection = self.lock()?;
        let embed_model = read_metadata_value(&connection, "embed_model")?.unwrap_or_default();
        let tx = connection.transaction()?;
        let mut inserted = 0usize;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let text_hash = sha256_text(&chunk.text);
            let chunk_id = sha256_text(&format!(
                "{embed_model}\n{}\n{text_hash}",
                chunk.metadata.physical_page
            ));
            inserted += tx.execute(
                "
                INSERT OR IGNORE INTO chunks(
                  chunk_id, physical_page, original_page, chapter, subchapter, section,
                  text, text_hash, embedding, embedding_dim
                )
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    chunk_id,
                    chunk.metadata.physical_page,
                    chunk.metadata.original_page,
                    chunk.metadata.chapter,
                    chunk.metadata.subchapter,
                    chunk.metadata.section,
                    chunk.text,
                    text_hash,
                    encode_embedding_blob(embedding),
                    embedding.len() as i64,
                ],
            )?;
        }
        tx.commit()?;

        if inserted < chunks.len() {
            debug!(
                duplicates = chunks.len() - inserted,
                "skipped chunks already present in the index"
            );
        }
        Ok(inserted)
    }

    /// Returns the `k` chunks most similar to `query_embedding`, best first.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || query_embedding.is_empty() {
            return Ok(Vec::new());
        }

        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "
            SELECT physical_page, original_page, chapter, subchapter, section, text,
                   embedding, embedding_dim
            FROM chunks
            ",
        )?;
        let mut rows = statement.query([])?;

        let mut scored = Vec::<RetrievedChunk>::new();
        let mut mismatched = 0usize;
        while let Some(row) = rows.next()? {
            let embedding_dim = row.get::<_, i64>(7)? as usize;
            let blob = row.get::<_, Vec<u8>>(6)?;
            let Some(embedding) = decode_embedding_blob(&blob, embedding_dim)
                .filter(|values| values.len() == query_embedding.len())
            else {
                mismatched += 1;
                continue;
            };

            scored.push(RetrievedChunk {
                similarity: cosine_similarity(query_embedding, &embedding),
                chunk: Chunk {
                    text: row.get(5)?,
                    metadata: ChunkMetadata {
                        physical_page: row.get(0)?,
                        original_page: row.get(1)?,
                        chapter: row.get(2)?,
                        subchapter: row.get(3)?,
                        section: row.get(4)?,
                    },
                },
            });
        }

        if mismatched > 0 {
            warn!(
                mismatched,
                query_dim = query_embedding.len(),
                "skipped index rows with mismatched embedding dimensions"
            );
        }

        scored.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn count_chunks(&self) -> Result<usize> {
        let connection = self.lock()?;
        let count: i64 = connection.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn metadata(&self) -> Result<IndexMetadata> {
        let connection = self.lock()?;
        Ok(IndexMetadata {
            schema_version: read_metadata_value(&connection, "schema_version")?,
            embed_model: read_metadata_value(&connection, "embed_model")?,
            source_sha256: read_metadata_value(&connection, "source_sha256")?,
            built_at: read_metadata_value(&connection, "built_at")?,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| RagError::Io(io::Error::other("vector store connection lock poisoned")))
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection.pragma_update(None, "journal_mode", "WAL")?;
    connection.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
          chunk_id TEXT PRIMARY KEY,
          physical_page INTEGER NOT NULL,
          original_page INTEGER NOT NULL,
          chapter TEXT NOT NULL,
          subchapter TEXT NOT NULL,
          section TEXT NOT NULL,
          text TEXT NOT NULL,
          text_hash TEXT NOT NULL,
          embedding BLOB NOT NULL,
          embedding_dim INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_physical_page ON chunks(physical_page);
        ",
    )?;
    Ok(())
}

fn read_metadata_value(connection: &Connection, key: &str) -> Result<Option<String>> {
    let value = connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(value)
}
