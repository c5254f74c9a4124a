use regex::Regex;

use crate::error::Result;

/// Pages shorter than this after cleaning carry nothing worth retrieving.
pub const MIN_PAGE_CHARS: usize = 150;

/// Per-page text cleanup. The rules are applied in a fixed order; later rules
/// assume the earlier ones already ran.
pub struct TextNormalizer {
    control_chars: Regex,
    italic_heading: Regex,
    copyright_and_doi: Regex,
    hyphen_break: Regex,
    dot_leaders: Regex,
    inline_space: Regex,
    blank_lines: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            control_chars: Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F\x{80}-\x{9F}]")?,
            italic_heading: Regex::new(r"(?m)^_(\d+\.[\d.]+)_ _(.*)_")?,
            copyright_and_doi: Regex::new(r"(?i)©.*|https?://doi\.org/\S+")?,
            hyphen_break: Regex::new(r"(\w+)-\s*\n\s*(\w+)")?,
            dot_leaders: Regex::new(r"\.{3,}")?,
            inline_space: Regex::new(r"[ \t]+")?,
            blank_lines: Regex::new(r"\n\s*\n+")?,
        })
    }

    pub fn clean(&self, raw: &str) -> String {
        let text = self.control_chars.replace_all(raw, "");
        let text = self.italic_heading.replace_all(&text, "### ${1} ${2}");
        let text = self.copyright_and_doi.replace_all(&text, "");
        let text = self.hyphen_break.replace_all(&text, "${1}${2}");
        let text = self.dot_leaders.replace_all(&text, "");
        let text = self.inline_space.replace_all(&text, " ");
        let text = self.blank_lines.replace_all(&text, "\n\n");
        text.trim().to_string()
    }
}

pub fn is_substantive(cleaned: &str) -> bool {
    cleaned.chars().count() >= MIN_PAGE_CHARS
}
