use serde::{Deserialize, Serialize};

pub const DEFAULT_CHAPTER: &str = "Front Matter";
pub const DEFAULT_SUBCHAPTER: &str = "General";
pub const DEFAULT_SECTION: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub depth: u8,
    pub title: String,
    pub start_page: u32,
}

impl OutlineEntry {
    pub fn new(depth: u8, title: impl Into<String>, start_page: u32) -> Self {
        Self {
            depth,
            title: title.into(),
            start_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyContext {
    pub chapter: String,
    pub subchapter: String,
    pub section: String,
}

impl Default for HierarchyContext {
    fn default() -> Self {
        Self {
            chapter: DEFAULT_CHAPTER.to_string(),
            subchapter: DEFAULT_SUBCHAPTER.to_string(),
            section: DEFAULT_SECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub physical_page: u32,
    pub raw_text: String,
    pub cleaned_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub physical_page: u32,
    pub chapter: String,
    pub subchapter: String,
    pub section: String,
    pub original_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestCounts {
    pub pages_total: usize,
    pub outline_entries: usize,
    pub pages_excluded: usize,
    pub pages_dropped_short: usize,
    pub pages_kept: usize,
    pub chunks_total: usize,
    pub chunks_refined: usize,
    pub batches_total: usize,
    pub batches_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestPaths {
    pub source_path: String,
    pub index_dir: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub index_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub duration_ms: u128,
    pub source_sha256: Option<String>,
    pub embed_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub failure_reason: Option<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub path: String,
    pub schema_version: Option<String>,
    pub embed_model: Option<String>,
    pub source_sha256: Option<String>,
    pub built_at: Option<String>,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub workspace: String,
    pub source_path: String,
    pub source_present: bool,
    pub index: Option<IndexStatus>,
    pub audit_log_path: String,
    pub audit_records: usize,
}
