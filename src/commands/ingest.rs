use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::IngestArgs;
use crate::config::AppConfig;
use crate::error::RagError;
use crate::ingest::{IngestReport, run_ingestion};
use crate::model::{IngestCounts, IngestPaths, IngestRunManifest};
use crate::store::INDEX_SCHEMA_VERSION;
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: IngestArgs) -> Result<()> {
    let config = AppConfig::from_ingest(&args).context("invalid ingest configuration")?;

    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("ingest-{}", utc_compact_string(started_ts));
    let manifest_path = config.ingest_manifest_path(&utc_compact_string(started_ts));

    info!(
        run_id = %run_id,
        workspace = %config.paths.workspace.display(),
        source = %config.paths.source_path.display(),
        embed_backend = config.models.embed_backend.as_str(),
        chunk_size = config.ingest.chunk_size,
        chunk_overlap = config.ingest.chunk_overlap,
        "starting ingest"
    );

    let outcome = run_ingestion(&config);

    let mut manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        index_schema_version: INDEX_SCHEMA_VERSION.to_string(),
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        duration_ms: started.elapsed().as_millis(),
        source_sha256: None,
        embed_model: config.models.embed_model_id(),
        chunk_size: config.ingest.chunk_size,
        chunk_overlap: config.ingest.chunk_overlap,
        paths: IngestPaths {
            source_path: config.paths.source_path.display().to_string(),
            index_dir: config.paths.index_dir.display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        counts: IngestCounts::default(),
        failure_reason: None,
        warnings: Vec::new(),
    };
    match &outcome {
        Ok(report) => {
            manifest.source_sha256 = Some(report.source_sha256.clone());
            manifest.embed_model.clone_from(&report.embed_model);
            manifest.counts = report.counts.clone();
            manifest.warnings.clone_from(&report.warnings);
        }
        Err(err) => {
            warn!(run_id = %run_id, error = %err, "ingest failed");
            manifest.status = "failed".to_string();
            manifest.failure_reason = Some(err.to_string());
        }
    }

    let report = record_outcome(&manifest_path, &manifest, outcome)?;
    info!(
        run_id = %run_id,
        pages_kept = report.counts.pages_kept,
        chunks = report.counts.chunks_total,
        duration_ms = manifest.duration_ms as u64,
        "ingest completed"
    );
    Ok(())
}

/// Writes the manifest, then hands back the ingestion outcome. A failed run
/// reports its own error even when the manifest cannot be written.
fn record_outcome(
    manifest_path: &Path,
    manifest: &IngestRunManifest,
    outcome: std::result::Result<IngestReport, RagError>,
) -> Result<IngestReport> {
    match write_json_pretty(manifest_path, manifest) {
        Ok(()) => info!(path = %manifest_path.display(), "wrote ingest run manifest"),
        Err(err) if outcome.is_err() => {
            warn!(path = %manifest_path.display(), error = %err, "failed to write ingest run manifest");
        }
        Err(err) => return Err(err),
    }
    outcome.context("ingestion failed")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn manifest(path: &Path) -> IngestRunManifest {
        IngestRunManifest {
            manifest_version: 1,
            run_id: "ingest-20260101T000000Z".to_string(),
            index_schema_version: INDEX_SCHEMA_VERSION.to_string(),
            status: "failed".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:01Z".to_string(),
            duration_ms: 1000,
            source_sha256: None,
            embed_model: "nomic-embed-text".to_string(),
            chunk_size: 1000,
            chunk_overlap: 150,
            paths: IngestPaths {
                source_path: "data/source.pdf".to_string(),
                index_dir: "index".to_string(),
                manifest_path: path.display().to_string(),
            },
            counts: IngestCounts::default(),
            failure_reason: Some("source missing".to_string()),
            warnings: Vec::new(),
        }
    }

    fn missing_source() -> RagError {
        RagError::SourceUnavailable {
            path: PathBuf::from("data/source.pdf"),
            reason: "not a readable file".to_string(),
        }
    }

    #[test]
    fn failed_run_writes_manifest_and_returns_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifests").join("ingest_run.json");

        let err = record_outcome(&path, &manifest(&path), Err(missing_source())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::SourceUnavailable { .. })
        ));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["status"], "failed");
    }

    #[test]
    fn unwritable_manifest_does_not_mask_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as the manifest file.
        let path = dir.path().to_path_buf();

        let err = record_outcome(&path, &manifest(&path), Err(missing_source())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RagError>(),
            Some(RagError::SourceUnavailable { .. })
        ));
    }
}
