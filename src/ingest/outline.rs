use std::collections::BTreeSet;

use crate::error::{RagError, Result};
use crate::model::{Chunk, HierarchyContext, OutlineEntry};

const FRONT_MATTER_TITLES: [&str; 3] = ["contents", "index", "table of contents"];

/// Pages excluded after a front-matter entry that is the last in the outline.
const TRAILING_EXCLUSION_SPAN: u32 = 10;

/// Document outline sorted by start page.
///
/// Every lookup stops scanning at the first entry past the requested page, so
/// the ordering is checked once here and relied on everywhere else.
#[derive(Debug, Clone, Default)]
pub struct Outline {
    entries: Vec<OutlineEntry>,
}

impl Outline {
    pub fn new(entries: Vec<OutlineEntry>) -> Result<Self> {
        for (index, pair) in entries.windows(2).enumerate() {
            if pair[1].start_page < pair[0].start_page {
                return Err(RagError::UnsortedOutline {
                    index: index + 1,
                    page: pair[1].start_page,
                    previous: pair[0].start_page,
                });
            }
        }

        let entries = entries
            .into_iter()
            .map(|entry| OutlineEntry {
                title: clean_title(&entry.title),
                ..entry
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pages spanned by contents/index entries: from the entry's start page up
    /// to the next entry's start page, or a fixed span for the last entry.
    pub fn excluded_pages(&self) -> BTreeSet<u32> {
        let mut excluded = BTreeSet::new();

        for (index, entry) in self.entries.iter().enumerate() {
            if !is_front_matter_title(&entry.title) {
                continue;
            }

            let end = self
                .entries
                .get(index + 1)
                .map(|next| next.start_page)
                .unwrap_or(entry.start_page + TRAILING_EXCLUSION_SPAN)
                .max(entry.start_page + 1);
            excluded.extend(entry.start_page..end);
        }

        excluded
    }

    pub fn hierarchy_for(&self, page: u32) -> HierarchyContext {
        let mut context = HierarchyContext::default();

        for entry in &self.entries {
            if entry.start_page > page {
                break;
            }

            match entry.depth {
                1 => {
                    context.chapter = entry.title.clone();
                    context.subchapter = entry.title.clone();
                    context.section = entry.title.clone();
                }
                2 => {
                    context.subchapter = entry.title.clone();
                    context.section = entry.title.clone();
                }
                3 => context.section = entry.title.clone(),
                _ => {}
            }
        }

        context
    }

    /// Corrects hierarchy bleed when a new heading starts mid-page: entries
    /// starting on the chunk's page whose title occurs in the chunk text
    /// overwrite the field at their depth. Returns whether anything changed.
    pub fn refine_chunk(&self, chunk: &mut Chunk) -> bool {
        let page = chunk.metadata.physical_page;
        let mut changed = false;

        for entry in &self.entries {
            if entry.start_page > page {
                break;
            }
            if entry.start_page != page
                || entry.title.is_empty()
                || !chunk.text.contains(entry.title.as_str())
            {
                continue;
            }

            let field = match entry.depth {
                1 => &mut chunk.metadata.chapter,
                2 => &mut chunk.metadata.subchapter,
                3 => &mut chunk.metadata.section,
                _ => continue,
            };
            if *field != entry.title {
                field.clone_from(&entry.title);
                changed = true;
            }
        }

        changed
    }
}

/// Strips a trailing run of two or more leader dots ("Chapter 3......").
pub fn clean_title(title: &str) -> String {
    let trimmed = title.trim();
    let without_dots = trimmed.trim_end_matches('.');
    if trimmed.len() - without_dots.len() >= 2 {
        without_dots.trim_end().to_string()
    } else {
        trimmed.to_string()
    }
}

fn is_front_matter_title(title: &str) -> bool {
    let lowered = title.trim().to_lowercase();
    FRONT_MATTER_TITLES.contains(&lowered.as_str())
}
