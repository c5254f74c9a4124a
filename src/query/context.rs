use crate::model::ScoredChunk;
use crate::util::char_prefix;

const PREVIEW_CHARS: usize = 200;

/// One `<DOCUMENT>` record per chunk, in the given order.
pub fn assemble_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .map(|scored| {
            let metadata = &scored.chunk.metadata;
            format!(
                "<DOCUMENT page='{}' chapter='{}' subchapter='{}' section='{}'>\n{}\n</DOCUMENT>",
                metadata.physical_page,
                attribute(&metadata.chapter),
                attribute(&metadata.subchapter),
                attribute(&metadata.section),
                scored.chunk.text
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

/// Short human-readable citations returned alongside the answer.
pub fn context_previews(chunks: &[ScoredChunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|scored| {
            format!(
                "Page {}: {}...",
                scored.chunk.metadata.physical_page,
                char_prefix(&scored.chunk.text, PREVIEW_CHARS)
            )
        })
        .collect()
}

// Attribute values are single-quoted.
fn attribute(value: &str) -> String {
    value.replace('\'', "&apos;")
}
