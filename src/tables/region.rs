// src/tables/region.rs

// --- Imports ---
use crate::document::TableRegion;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Constants ---
// Headings longer than this are prose, not section titles
const MAX_HEADING_CHARS: usize = 80;
const MAX_HEADING_WORDS: usize = 8;
// Lowercase words a title may contain, e.g. "Allocation by Weight"
const MINOR_WORDS: &[&str] = &["a", "an", "and", "as", "at", "by", "for", "in", "of", "on", "per", "the", "to", "vs"];

// --- Header Word Groups (Lazy Static) ---
// A line is a domain header when it hits at least two words of one group.
static HEADER_GROUPS: Lazy<Vec<Vec<Regex>>> = Lazy::new(|| {
    let groups: [&[&str]; 3] = [
        // Securities / holdings
        &[
            r"\bisin\b",
            r"\bname\b",
            r"\b(?:quantity|qty|units|shares|nominal)\b",
            r"\bprice\b",
            r"\bvalue\b",
            r"\b(?:currency|ccy)\b",
        ],
        // Asset allocation
        &[
            r"\basset\s+class\b",
            r"\ballocation\b",
            r"\bweight(?:ing)?\b",
            r"\bcategory\b",
            r"%",
        ],
        // Performance
        &[
            r"\bperiod\b",
            r"\breturns?\b",
            r"\bytd\b",
            r"\bperformance\b",
            r"\bbenchmark\b",
        ],
    ];
    groups
        .iter()
        .map(|group| {
            group
                .iter()
                .filter_map(|pat| Regex::new(&format!("(?i){}", pat)).ok())
                .collect()
        })
        .collect()
});

// Lines made only of rule characters, e.g. "-----+------" or "======"
static SEPARATOR_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s\-=+|:]+$").expect("Failed to compile SEPARATOR_LINE_RE")
});

// --- Line Classification ---

/// True when the line hits two or more header words of one domain group.
pub fn is_domain_header(line: &str) -> bool {
    HEADER_GROUPS
        .iter()
        .any(|group| group.iter().filter(|re| re.is_match(line)).count() >= 2)
}

/// True when at least half of the (two or more) tokens start with an uppercase letter.
pub fn is_capitalized_header(line: &str) -> bool {
    let tokens: Vec<&str> = line
        .split_whitespace()
        .filter(|t| !t.chars().all(|c| matches!(c, '|' | '+' | '-' | '=' | ':')))
        .collect();
    if tokens.len() < 2 {
        return false;
    }
    let capitalized = tokens
        .iter()
        .filter(|t| t.chars().next().map(char::is_uppercase).unwrap_or(false))
        .count();
    capitalized * 2 >= tokens.len()
}

pub fn is_header_candidate(line: &str) -> bool {
    !is_blank_or_separator(line) && (is_domain_header(line) || is_capitalized_header(line))
}

pub fn is_separator_line(line: &str) -> bool {
    !line.trim().is_empty() && SEPARATOR_LINE_RE.is_match(line)
}

fn is_blank_or_separator(line: &str) -> bool {
    line.trim().is_empty() || is_separator_line(line)
}

/// Short, title-like line that can name the table below it.
fn looks_like_heading(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_HEADING_CHARS || trimmed.contains('|') {
        return false;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > MAX_HEADING_WORDS || trimmed.ends_with('.') {
        return false;
    }
    let digits = trimmed.chars().filter(char::is_ascii_digit).count();
    if digits * 3 > trimmed.len() {
        return false;
    }
    trimmed.ends_with(':')
        || words
            .iter()
            .filter(|w| w.chars().next().map(char::is_alphabetic).unwrap_or(false))
            .filter(|w| !MINOR_WORDS.contains(&w.to_lowercase().as_str()))
            .all(|w| w.chars().next().map(char::is_uppercase).unwrap_or(false))
}

/// True when the line is split into columns by a delimiter, a tab or a run of spaces.
fn has_column_breaks(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains(['|', '\t']) || trimmed.contains("  ")
}

// --- Detector ---

/// Scans document text for line spans that look like tables.
pub struct TableRegionDetector<'a> {
    lines: Vec<&'a str>,
}

impl<'a> TableRegionDetector<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
        }
    }

    /// Lines covered by a region.
    pub fn region_lines(&self, region: &TableRegion) -> &[&'a str] {
        let end = region.end_line.min(self.lines.len().saturating_sub(1));
        &self.lines[region.start_line.min(end)..=end]
    }

    /// Lazy single pass over the text. Calling again restarts from the top.
    pub fn regions(&self) -> RegionIter<'_, 'a> {
        RegionIter {
            lines: &self.lines,
            cursor: 0,
            heading: None,
        }
    }
}

pub struct RegionIter<'d, 'a> {
    lines: &'d [&'a str],
    cursor: usize,
    heading: Option<String>,
}

impl RegionIter<'_, '_> {
    fn title_for(&self, start_line: usize) -> String {
        self.heading
            .clone()
            .unwrap_or_else(|| format!("Table from line {}", start_line + 1))
    }

    /// Index of the line that terminates the region starting at `start`.
    fn region_end(&self, start: usize) -> usize {
        let mut idx = start + 1;
        // A rule directly under the header underlines it
        if idx < self.lines.len() && is_separator_line(self.lines[idx]) {
            idx += 1;
        }
        while idx < self.lines.len() && !is_blank_or_separator(self.lines[idx]) {
            idx += 1;
        }
        idx
    }
}

impl Iterator for RegionIter<'_, '_> {
    type Item = TableRegion;

    fn next(&mut self) -> Option<TableRegion> {
        while self.cursor < self.lines.len() {
            let idx = self.cursor;
            let line = self.lines[idx];

            if !is_header_candidate(line) {
                if looks_like_heading(line) {
                    self.heading = Some(line.trim().trim_end_matches(':').trim().to_string());
                }
                self.cursor += 1;
                continue;
            }

            // A title right above a real header names that table, even when the
            // title itself carries header words as long as it has no columns
            let next_is_domain = self
                .lines
                .get(idx + 1)
                .map(|l| is_domain_header(l))
                .unwrap_or(false);
            let titles_next = !is_domain_header(line) || !has_column_breaks(line);
            if next_is_domain && titles_next && looks_like_heading(line) {
                tracing::trace!("Line {} treated as heading for the table below", idx + 1);
                self.heading = Some(line.trim().trim_end_matches(':').trim().to_string());
                self.cursor += 1;
                continue;
            }

            let stop = self.region_end(idx);
            self.cursor = stop;

            // Last line holding content, skipping a trailing underline
            let mut end_line = stop - 1;
            while end_line > idx && is_separator_line(self.lines[end_line]) {
                end_line -= 1;
            }

            if end_line == idx {
                // Single header-like line: remember it as a heading instead
                if looks_like_heading(line) {
                    self.heading = Some(line.trim().trim_end_matches(':').trim().to_string());
                }
                continue;
            }

            let region = TableRegion {
                start_line: idx,
                end_line,
                title: self.title_for(idx),
            };
            tracing::debug!(
                "Detected table region '{}' at lines {}-{}",
                region.title,
                region.start_line + 1,
                region.end_line + 1
            );
            return Some(region);
        }
        None
    }
}
