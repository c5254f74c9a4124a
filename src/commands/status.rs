use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::audit::AuditLog;
use crate::cli::StatusArgs;
use crate::config::AppConfig;
use crate::model::{IndexStatus, StatusReport};
use crate::store::VectorStore;

pub fn run(args: StatusArgs) -> Result<()> {
    let config = AppConfig::from_common(&args.common).context("invalid status configuration")?;
    info!(workspace = %config.paths.workspace.display(), "status requested");

    let source_present = config.paths.source_path.is_file();
    if !source_present {
        warn!(path = %config.paths.source_path.display(), "source document missing");
    }

    let index = match VectorStore::open_existing(&config.paths.index_dir, None) {
        Ok(store) => {
            let metadata = store.metadata().context("failed to read index metadata")?;
            let chunks = store.count_chunks().context("failed to count indexed chunks")?;
            info!(
                path = %store.path().display(),
                schema_version = %metadata.schema_version.clone().unwrap_or_default(),
                embed_model = %metadata.embed_model.clone().unwrap_or_default(),
                built_at = %metadata.built_at.clone().unwrap_or_default(),
                chunks,
                "index status"
            );
            Some(IndexStatus {
                path: store.path().display().to_string(),
                schema_version: metadata.schema_version,
                embed_model: metadata.embed_model,
                source_sha256: metadata.source_sha256,
                built_at: metadata.built_at,
                chunks,
            })
        }
        Err(err) => {
            warn!(path = %config.paths.index_dir.display(), error = %err, "index unavailable");
            None
        }
    };

    let audit = AuditLog::new(config.paths.audit_log_path.clone());
    let audit_records = audit
        .count_records()
        .with_context(|| format!("failed to read {}", audit.path().display()))?;
    info!(path = %audit.path().display(), records = audit_records, "audit log status");

    if args.json {
        let report = StatusReport {
            workspace: config.paths.workspace.display().to_string(),
            source_path: config.paths.source_path.display().to_string(),
            source_present,
            index,
            audit_log_path: audit.path().display().to_string(),
            audit_records,
        };
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize status json output")?;
        writeln!(output)?;
        output.flush()?;
    }

    Ok(())
}
