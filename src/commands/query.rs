use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::QueryArgs;
use crate::config::AppConfig;
use crate::model::QueryResult;
use crate::query::RagEngine;

pub fn run(args: QueryArgs) -> Result<()> {
    let config = AppConfig::from_query(&args).context("invalid query configuration")?;
    let engine = RagEngine::open(&config).context("failed to initialise query engine")?;

    info!(question = %args.question, "answering question");
    let result = engine
        .query(&args.question)
        .with_context(|| format!("failed to answer question: {}", args.question))?;
    if let Some(audit_error) = &result.audit_error {
        warn!(error = %audit_error, "answer was not recorded in the audit log");
    }

    if args.json {
        write_json_response(&result)
    } else {
        write_text_response(&args.question, &result)
    }
}

fn write_json_response(result: &QueryResult) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, result)
        .context("failed to serialize query json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(question: &str, result: &QueryResult) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Question: {question}")?;
    writeln!(output)?;
    writeln!(output, "{}", result.answer.trim())?;

    if !result.contexts.is_empty() {
        writeln!(output)?;
        writeln!(output, "Sources:")?;
        for (index, context) in result.contexts.iter().enumerate() {
            writeln!(output, "  {}. {context}", index + 1)?;
        }
    }

    output.flush()?;
    Ok(())
}
