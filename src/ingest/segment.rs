use std::collections::VecDeque;

use crate::error::{RagError, Result};
use crate::model::{Chunk, ChunkMetadata, HierarchyContext, PageRecord};

/// Cut points in priority order: paragraphs, lines, sentences, words, chars.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Recursive character splitter. Lengths are counted in characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    /// Cuts a page into chunks, each carrying the page's metadata.
    pub fn segment_page(&self, page: &PageRecord, hierarchy: &HierarchyContext) -> Vec<Chunk> {
        self.split(&page.cleaned_text)
            .into_iter()
            .map(|text| Chunk {
                text,
                metadata: ChunkMetadata {
                    physical_page: page.physical_page,
                    chapter: hierarchy.chapter.clone(),
                    subchapter: hierarchy.subchapter.clone(),
                    section: hierarchy.section.clone(),
                    original_page: page.physical_page.saturating_sub(1),
                },
            })
            .collect()
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = separators.last().copied().unwrap_or("");
        let mut finer: &[&str] = &[];
        for (index, candidate) in separators.iter().copied().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate) {
                separator = candidate;
                finer = &separators[index + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting = Vec::<&str>::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    /// Greedily packs pieces up to the size limit. After each emitted chunk
    /// the leading pieces are released until at most `chunk_overlap`
    /// characters carry over into the next one.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window = VecDeque::<&str>::new();
        let mut total = 0usize;

        for piece in pieces.iter().copied() {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_trimmed(&window) {
                    merged.push(chunk);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size)
                {
                    let Some(released) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(released);
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&window) {
            merged.push(chunk);
        }
        merged
    }
}

/// Splits on `separator`, keeping it at the start of the piece that follows.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(index, character)| &text[index..index + character.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
