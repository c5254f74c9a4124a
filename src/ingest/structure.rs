use std::path::Path;
use std::process::Command;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{RagError, Result};
use crate::model::OutlineEntry;

/// Raw physical structure of the source: one text entry per page, in page
/// order, plus the machine-readable outline when the document has one.
#[derive(Debug, Clone, Default)]
pub struct DocumentStructure {
    pub pages: Vec<String>,
    pub outline: Vec<OutlineEntry>,
}

impl DocumentStructure {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

pub trait StructuralAnalyzer {
    fn analyze(&self, source: &Path) -> Result<DocumentStructure>;
}

/// Structural analysis through poppler's `pdftotext` and `pdftohtml`.
#[derive(Debug, Clone, Default)]
pub struct PopplerAnalyzer {
    max_pages: Option<usize>,
}

impl PopplerAnalyzer {
    pub fn new(max_pages: Option<usize>) -> Self {
        Self { max_pages }
    }
}

impl StructuralAnalyzer for PopplerAnalyzer {
    fn analyze(&self, source: &Path) -> Result<DocumentStructure> {
        let pages = extract_pages_with_pdftotext(source, self.max_pages)?;
        let outline = extract_outline_with_pdftohtml(source)?;
        info!(
            source = %source.display(),
            pages = pages.len(),
            outline_entries = outline.len(),
            "structural analysis complete"
        );
        Ok(DocumentStructure { pages, outline })
    }
}

fn run_tool(command: &mut Command, tool: &str, source: &Path) -> Result<String> {
    let output = command.output().map_err(|err| {
        RagError::Extraction(format!(
            "failed to execute {tool} for {}: {err}",
            source.display()
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RagError::Extraction(format!(
            "{tool} returned non-zero exit status for {}: {}",
            source.display(),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn extract_pages_with_pdftotext(source: &Path, max_pages: Option<usize>) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(source).arg("-");

    let raw = run_tool(&mut command, "pdftotext", source)?;
    Ok(split_pages(&raw))
}

/// Splits pdftotext output on form feeds, dropping the empty tail it emits.
pub(crate) fn split_pages(raw: &str) -> Vec<String> {
    let mut pages: Vec<String> = raw.split('\u{000C}').map(str::to_string).collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    pages
}

fn extract_outline_with_pdftohtml(source: &Path) -> Result<Vec<OutlineEntry>> {
    let mut command = Command::new("pdftohtml");
    command
        .arg("-xml")
        .arg("-i")
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg("1")
        .arg(source)
        .arg("-stdout");

    let xml = run_tool(&mut command, "pdftohtml", source)?;
    parse_outline_xml(&xml)
}

/// Reads the `<outline>` tree emitted by `pdftohtml -xml`; nesting of
/// `<outline>` elements gives each item's depth.
pub(crate) fn parse_outline_xml(xml: &str) -> Result<Vec<OutlineEntry>> {
    let token_regex =
        Regex::new(r#"(?s)(<outline>)|(</outline>)|<item(?:\s+page="(\d+)")?\s*>(.*?)</item>"#)?;

    let mut entries = Vec::<OutlineEntry>::new();
    let mut depth = 0usize;
    let mut unresolved = 0usize;

    for captures in token_regex.captures_iter(xml) {
        if captures.get(1).is_some() {
            depth += 1;
            continue;
        }
        if captures.get(2).is_some() {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth == 0 {
            continue;
        }

        let start_page = captures
            .get(3)
            .and_then(|value| value.as_str().parse::<u32>().ok())
            .filter(|page| *page >= 1);
        let Some(start_page) = start_page else {
            unresolved += 1;
            continue;
        };

        let raw_label = captures.get(4).map(|value| value.as_str()).unwrap_or("");
        let title = normalize_outline_label(raw_label);
        if title.is_empty() {
            continue;
        }

        entries.push(OutlineEntry::new(
            u8::try_from(depth).unwrap_or(u8::MAX),
            title,
            start_page,
        ));
    }

    if unresolved > 0 {
        debug!(unresolved, "skipped outline items without a target page");
    }
    Ok(entries)
}

fn normalize_outline_label(raw_label: &str) -> String {
    let without_tags = raw_label
        .split('<')
        .enumerate()
        .map(|(index, segment)| {
            if index == 0 {
                segment
            } else {
                segment.split_once('>').map(|(_, rest)| rest).unwrap_or("")
            }
        })
        .collect::<String>();

    without_tags
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .replace('\u{00a0}', " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}
