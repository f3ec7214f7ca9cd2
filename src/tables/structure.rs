// src/tables/structure.rs

// --- Imports ---
use crate::document::Table;
use crate::tables::region::is_separator_line;
use once_cell::sync::Lazy;
use regex::Regex;

// --- Constants ---
// Minimum headers / rows for a strategy result to be accepted
const MIN_HEADERS: usize = 2;
const MIN_ROWS: usize = 1;

// --- Regex Patterns (Lazy Static) ---
static MULTI_SPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s{2,}|\t").expect("Failed to compile MULTI_SPACE_RE")
});

/// Raw output of one column-splitting strategy before it becomes a `Table`.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SplitTable {
    fn is_acceptable(&self) -> bool {
        self.headers.len() >= MIN_HEADERS
            && self
                .rows
                .iter()
                .filter(|row| row.iter().any(|cell| !cell.is_empty()))
                .count()
                >= MIN_ROWS
    }
}

// --- Strategy Trait ---

/// One way of cutting region lines into header and row cells.
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` when the strategy does not apply to these lines.
    fn split(&self, lines: &[&str]) -> Option<SplitTable>;
}

/// Content lines only: blank and rule lines carry no cells.
fn content_lines<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    lines
        .iter()
        .copied()
        .filter(|l| !l.trim().is_empty() && !is_separator_line(l))
        .collect()
}

fn non_empty_row(row: &[String]) -> bool {
    row.iter().any(|c| !c.is_empty())
}

// --- Fixed-Width Strategy ---

/// Column boundaries come from where each header segment starts.
pub struct FixedWidthStrategy;

impl FixedWidthStrategy {
    /// (start, text) of every header segment separated by two or more spaces.
    fn header_segments(header: &[char]) -> Vec<(usize, String)> {
        let mut segments = Vec::new();
        let mut idx = 0;
        while idx < header.len() {
            if header[idx].is_whitespace() {
                idx += 1;
                continue;
            }
            let start = idx;
            let mut end = idx;
            while end < header.len() {
                if header[end].is_whitespace() {
                    // one space stays inside the segment ("Asset Class")
                    let next_is_space = header.get(end + 1).map(|c| c.is_whitespace()).unwrap_or(true);
                    if next_is_space || header[end] == '\t' {
                        break;
                    }
                }
                end += 1;
            }
            let text: String = header[start..end].iter().collect();
            segments.push((start, text.trim().to_string()));
            idx = end;
        }
        segments
    }

    /// Slices one row at the boundaries, moving each cut left while it would
    /// split a token so right-aligned numbers stay whole. Returns `None` when
    /// a cut collapses onto the previous one (the row does not line up).
    fn slice_row(row: &[char], boundaries: &[usize]) -> Option<Vec<String>> {
        let mut cuts = Vec::with_capacity(boundaries.len());
        for (i, &boundary) in boundaries.iter().enumerate() {
            if i == 0 {
                cuts.push(0);
                continue;
            }
            let prev = cuts[i - 1];
            let mut cut = boundary.min(row.len());
            while cut > prev
                && cut < row.len()
                && !row[cut].is_whitespace()
                && !row[cut - 1].is_whitespace()
            {
                cut -= 1;
            }
            if cut == prev && boundary < row.len() {
                return None;
            }
            // Cutting after a single space splits a phrase like "Apple Inc."
            if cut >= 2
                && cut < row.len()
                && !row[cut].is_whitespace()
                && row[cut - 1].is_whitespace()
                && !row[cut - 2].is_whitespace()
            {
                return None;
            }
            cuts.push(cut);
        }

        let cells: Vec<String> = cuts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = cuts.get(i + 1).copied().unwrap_or(row.len());
                if start >= row.len() || start >= end {
                    String::new()
                } else {
                    row[start..end].iter().collect::<String>().trim().to_string()
                }
            })
            .collect();

        // Two values landed in one column
        if cells.iter().any(|c| c.contains("  ") || c.contains('\t')) {
            return None;
        }
        Some(cells)
    }
}

impl ExtractionStrategy for FixedWidthStrategy {
    fn name(&self) -> &'static str {
        "fixed-width"
    }

    fn split(&self, lines: &[&str]) -> Option<SplitTable> {
        let lines = content_lines(lines);
        let (header_line, body) = lines.split_first()?;
        if header_line.contains('|') || header_line.contains('+') {
            return None;
        }

        let header: Vec<char> = header_line.chars().collect();
        let segments = Self::header_segments(&header);
        if segments.len() < MIN_HEADERS {
            return None;
        }
        let boundaries: Vec<usize> = segments.iter().map(|(start, _)| *start).collect();

        let mut rows = Vec::new();
        let mut misaligned = 0;
        for line in body {
            let chars: Vec<char> = line.chars().collect();
            match Self::slice_row(&chars, &boundaries) {
                Some(cells) => rows.push(cells),
                None => misaligned += 1,
            }
        }

        if misaligned * 2 > body.len() {
            tracing::trace!("Fixed-width declined: {} of {} rows misaligned", misaligned, body.len());
            return None;
        }

        Some(SplitTable {
            headers: segments.into_iter().map(|(_, text)| text).collect(),
            rows,
        })
    }
}

// --- Delimited Strategy ---

/// Splits on `|` (or `+` when no pipe is present).
pub struct DelimitedStrategy;

impl DelimitedStrategy {
    fn split_line(line: &str, delimiter: char) -> Vec<String> {
        let mut tokens: Vec<String> = line
            .split(delimiter)
            .map(|t| t.trim().to_string())
            .collect();
        // "| a | b |" leaves empty tokens at both ends
        while tokens.first().map(|t| t.is_empty()).unwrap_or(false) {
            tokens.remove(0);
        }
        while tokens.last().map(|t| t.is_empty()).unwrap_or(false) {
            tokens.pop();
        }
        tokens
    }
}

impl ExtractionStrategy for DelimitedStrategy {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn split(&self, lines: &[&str]) -> Option<SplitTable> {
        let lines = content_lines(lines);
        let (header_line, body) = lines.split_first()?;
        let delimiter = if header_line.contains('|') {
            '|'
        } else if header_line.contains('+') {
            '+'
        } else {
            return None;
        };

        let headers = Self::split_line(header_line, delimiter);
        let rows = body
            .iter()
            .map(|line| Self::split_line(line, delimiter))
            .filter(|row| non_empty_row(row))
            .collect();
        Some(SplitTable { headers, rows })
    }
}

// --- Space-Separated Strategy ---

/// Splits every line on runs of two or more spaces (or tabs).
pub struct SpaceSeparatedStrategy;

impl SpaceSeparatedStrategy {
    fn split_line(line: &str) -> Vec<String> {
        MULTI_SPACE_RE
            .split(line.trim())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

impl ExtractionStrategy for SpaceSeparatedStrategy {
    fn name(&self) -> &'static str {
        "space-separated"
    }

    fn split(&self, lines: &[&str]) -> Option<SplitTable> {
        let lines = content_lines(lines);
        let (header_line, body) = lines.split_first()?;
        let headers = Self::split_line(header_line);
        let rows = body
            .iter()
            .map(|line| Self::split_line(line))
            .filter(|row| non_empty_row(row))
            .collect();
        Some(SplitTable { headers, rows })
    }
}

// --- Aggressive Fallback Strategy ---

/// Splits on single whitespace and keeps rows at least as wide as the header.
pub struct AggressiveStrategy;

impl ExtractionStrategy for AggressiveStrategy {
    fn name(&self) -> &'static str {
        "aggressive"
    }

    fn split(&self, lines: &[&str]) -> Option<SplitTable> {
        let lines = content_lines(lines);
        let tokenized: Vec<Vec<String>> = lines
            .iter()
            .map(|l| l.split_whitespace().map(str::to_string).collect())
            .collect();

        let header_idx = tokenized.iter().position(|tokens| tokens.len() >= MIN_HEADERS)?;
        let headers = tokenized[header_idx].clone();
        let rows = tokenized[header_idx + 1..]
            .iter()
            .filter(|tokens| tokens.len() >= headers.len())
            .map(|tokens| tokens[..headers.len()].to_vec())
            .collect();
        Some(SplitTable { headers, rows })
    }
}

// --- Main Extractor Structure ---

/// Tries each strategy in priority order and keeps the first acceptable result.
pub struct TableStructureExtractor {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Default for TableStructureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStructureExtractor {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(FixedWidthStrategy),
                Box::new(DelimitedStrategy),
                Box::new(SpaceSeparatedStrategy),
                Box::new(AggressiveStrategy),
            ],
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// `None` means "no table here", which is a normal outcome.
    pub fn extract(&self, title: &str, lines: &[&str]) -> Option<Table> {
        for strategy in &self.strategies {
            let Some(split) = strategy.split(lines) else {
                tracing::trace!("Strategy '{}' does not apply to '{}'", strategy.name(), title);
                continue;
            };
            if !split.is_acceptable() {
                tracing::trace!(
                    "Strategy '{}' rejected for '{}': {} headers, {} rows",
                    strategy.name(),
                    title,
                    split.headers.len(),
                    split.rows.len()
                );
                continue;
            }

            tracing::debug!(
                "Extracted table '{}' with strategy '{}' ({} columns, {} rows)",
                title,
                strategy.name(),
                split.headers.len(),
                split.rows.len()
            );
            let rows = split.rows.into_iter().filter(|r| non_empty_row(r)).collect();
            return Some(Table::new(title, split.headers, rows));
        }

        tracing::debug!("No strategy produced a table for '{}'", title);
        None
    }
}

// --- Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    fn extract(lines: &[&str]) -> Option<Table> {
        TableStructureExtractor::new().extract("test", lines)
    }

    #[test]
    fn strategies_run_in_fixed_order() {
        assert_eq!(
            TableStructureExtractor::new().strategy_names(),
            vec!["fixed-width", "delimited", "space-separated", "aggressive"]
        );
    }

    #[test]
    fn delimited_rows_split_on_pipes() {
        let table = extract(&[
            "ISIN          | Name           | Quantity | Price    | Value     | Currency",
            "US0378331005  | Apple Inc.     | 100      | 190.50   | 19,050.00 | USD",
        ])
        .expect("table");
        assert_eq!(
            table.headers,
            vec!["ISIN", "Name", "Quantity", "Price", "Value", "Currency"]
        );
        assert_eq!(
            table.rows[0],
            vec!["US0378331005", "Apple Inc.", "100", "190.50", "19,050.00", "USD"]
        );
    }

    #[test]
    fn bordered_table_drops_outer_empty_tokens() {
        let table = extract(&[
            "+--------+-------+",
            "| Period | Return |",
            "+--------+-------+",
            "| YTD    | 5.2%   |",
            "| 1 Year | 8.1%   |",
            "+--------+-------+",
        ])
        .expect("table");
        assert_eq!(table.headers, vec!["Period", "Return"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["1 Year", "8.1%"]);
    }

    #[test]
    fn fixed_width_keeps_multi_word_headers_and_empty_cells() {
        let table = extract(&[
            "Asset Class      Allocation      Value",
            "Stocks           60%             750,000",
            "Real Estate                      125,000",
        ])
        .expect("table");
        assert_eq!(table.headers, vec!["Asset Class", "Allocation", "Value"]);
        assert_eq!(table.rows[0], vec!["Stocks", "60%", "750,000"]);
        assert_eq!(table.rows[1], vec!["Real Estate", "", "125,000"]);
    }

    #[test]
    fn fixed_width_snaps_cuts_for_right_aligned_numbers() {
        let table = extract(&[
            "Name            Quantity      Value",
            "Big Fund       1,000,000    12,500",
        ])
        .expect("table");
        assert_eq!(table.rows[0], vec!["Big Fund", "1,000,000", "12,500"]);
    }

    #[test]
    fn space_separated_handles_misaligned_rows() {
        // Rows do not line up with the header columns at all
        let table = extract(&[
            "Name  Quantity  Value",
            "Apple Inc.  100  19,050",
            "Microsoft Corporation  50  20,500",
        ])
        .expect("table");
        assert_eq!(table.headers, vec!["Name", "Quantity", "Value"]);
        assert_eq!(table.rows[0], vec!["Apple Inc.", "100", "19,050"]);
        assert_eq!(table.rows[1], vec!["Microsoft Corporation", "50", "20,500"]);
    }

    #[test]
    fn aggressive_fallback_truncates_extra_tokens() {
        let table = extract(&["Name Quantity Value", "Apple 100 19050 extra", "short 1"])
            .expect("table");
        assert_eq!(table.headers, vec!["Name", "Quantity", "Value"]);
        assert_eq!(table.rows, vec![vec!["Apple", "100", "19050"]]);
    }

    #[test]
    fn no_strategy_means_no_table() {
        assert!(extract(&["Summary", "nothing"]).is_none());
        assert!(extract(&[]).is_none());
    }

    #[test]
    fn every_row_matches_header_width() {
        let inputs: [&[&str]; 3] = [
            &["A | B | C", "1 | 2", "1 | 2 | 3 | 4"],
            &["A    B    C", "1    2    3    4"],
            &["Alpha  Beta", "x  y  z", "w"],
        ];
        for lines in inputs {
            if let Some(table) = extract(lines) {
                assert!(
                    table.rows.iter().all(|r| r.len() == table.headers.len()),
                    "{:?}",
                    table
                );
            }
        }
    }
}
