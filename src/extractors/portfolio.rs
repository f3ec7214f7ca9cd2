// src/extractors/portfolio.rs

// --- Imports ---
use crate::document::{ExtractionSource, PortfolioInfo, Table};
use crate::extractors::{EntityExtractor, Extracted};
use crate::utils::numbers::{currency_from_symbol, detect_currency, parse_number, KNOWN_CURRENCIES};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Constants ---
// Only the top of the document is searched for a title line
const TITLE_SEARCH_LINES: usize = 10;
const MAX_TITLE_CHARS: usize = 100;
// A key/value table needs at least this many recognised labels
const MIN_KEY_VALUE_LABELS: usize = 2;

/// Scalar fields of `PortfolioInfo` that are found by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Date,
    TotalValue,
    Currency,
    Owner,
    Manager,
    AccountNumber,
    Custodian,
    Benchmark,
    Strategy,
}

// Label spellings per field, longest first within a field.
const FIELD_LABELS: &[(Field, &[&str])] = &[
    (Field::AccountNumber, &["account number", "account no", "account #", "portfolio number", "portfolio no", "acct no"]),
    (Field::TotalValue, &["total portfolio value", "total market value", "total value", "portfolio value", "net asset value", "total assets"]),
    (Field::Currency, &["reference currency", "reporting currency", "base currency", "currency"]),
    (Field::Date, &["valuation date", "statement date", "report date", "as of", "as at", "date"]),
    (Field::Manager, &["portfolio manager", "relationship manager", "wealth manager", "client advisor", "investment advisor", "advisor", "adviser", "manager"]),
    (Field::Owner, &["account holder", "account name", "client name", "portfolio owner", "prepared for", "investor", "client", "owner"]),
    (Field::Custodian, &["custodian bank", "custodian", "custody bank", "depositary"]),
    (Field::Benchmark, &["benchmark"]),
    (Field::Strategy, &["investment strategy", "investment objective", "risk profile", "mandate", "strategy"]),
];

// --- Regex Patterns for Text Matching (Lazy Static) ---
const DATE_PATTERN: &str = r"\d{4}-\d{2}-\d{2}|\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+[A-Za-z]{3,9}\.?\s+\d{4}";

static TITLE_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:portfolio|statement|report|valuation|summary|overview)\b")
        .expect("Failed to compile TITLE_KEYWORD_RE")
});

static DATE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Pattern 1: labelled date
        format!(r"(?i)\b(?:valuation\s+date|statement\s+date|report\s+date|as\s+of|as\s+at|date)\b\s*[:\-]?\s*({})", DATE_PATTERN),
        // Pattern 2: period wording
        format!(r"(?i)\bperiod\s+end(?:ing|ed)?\s*[:\-]?\s*({})", DATE_PATTERN),
        // Pattern 3: any date at all
        format!(r"({})", DATE_PATTERN),
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

// Captures: cur (symbol or code before the amount), num, code (code after the amount)
static TOTAL_VALUE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    let amount = r"(?P<cur>[$€£¥]|USD|EUR|GBP|CHF|JPY|CAD|AUD)?\s*(?P<num>\d[\d,']*(?:\.\d+)?)(?:\s*(?P<code>USD|EUR|GBP|CHF|JPY|CAD|AUD)\b)?";
    [
        // Pattern 1: "Total Portfolio Value: $1,250,000"
        format!(r"(?i)\btotal\s+(?:portfolio\s+|market\s+)?value\b[^\n\d$€£¥]{{0,20}}?{}", amount),
        // Pattern 2: "Portfolio Value" / "Net Asset Value"
        format!(r"(?i)\b(?:portfolio|net\s+asset)\s+value\b[^\n\d$€£¥]{{0,20}}?{}", amount),
        // Pattern 3: "Total Assets"
        format!(r"(?i)\btotal\s+assets\b[^\n\d$€£¥]{{0,20}}?{}", amount),
        // Pattern 4: loose keyword followed by a currency-marked amount
        r"(?i)\b(?:total|portfolio|value)\b[^\n\d]{0,30}?(?P<cur>[$€£¥])\s*(?P<num>\d[\d,]*(?:\.\d+)?)".to_string(),
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

static CURRENCY_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(?:reference|reporting|base|portfolio)?\s*currency\s*[:\-]\s*([A-Za-z]{3})\b",
        r"(?i)\b(?:all\s+)?(?:amounts|figures|values)\s+(?:are\s+)?(?:in|expressed\s+in)\s+([A-Za-z]{3})\b",
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

/// One "Label: value" regex per field, built from the label table.
static LABELLED_RES: Lazy<Vec<(Field, Regex)>> = Lazy::new(|| {
    FIELD_LABELS
        .iter()
        .filter(|(field, _)| !matches!(field, Field::Date | Field::TotalValue | Field::Currency))
        .filter_map(|(field, labels)| {
            let alternation = labels
                .iter()
                .map(|l| regex::escape(l).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            // Value runs to end of line or to a gap of two spaces
            let pattern = format!(r"(?im)^\s*(?:{})\.?\s*[:\-]\s*(\S[^\n]*?)(?:\s{{2,}}|\s*$)", alternation);
            Regex::new(&pattern).ok().map(|re| (*field, re))
        })
        .collect()
});

// --- Helpers ---

/// Field for a table label cell ("Account No.:" → AccountNumber).
fn field_for_label(label: &str) -> Option<Field> {
    let normalized = label
        .trim()
        .trim_end_matches([':', '.'])
        .trim()
        .to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    FIELD_LABELS.iter().find_map(|(field, labels)| {
        labels
            .iter()
            .any(|l| normalized == *l || normalized.starts_with(&format!("{} ", l)))
            .then_some(*field)
    })
}

fn normalize_currency(raw: &str) -> Option<String> {
    let code = raw.trim().to_uppercase();
    if KNOWN_CURRENCIES.contains(&code.as_str()) {
        return Some(code);
    }
    raw.trim().chars().next().and_then(currency_from_symbol).map(str::to_string)
}

fn set_field(info: &mut PortfolioInfo, field: Field, raw: &str) -> bool {
    let value = raw.trim();
    if value.is_empty() {
        return false;
    }
    match field {
        Field::TotalValue => match parse_number(value) {
            Some(total) => {
                info.total_value = Some(total);
                if let Some(currency) = detect_currency(value) {
                    info.currency = currency;
                }
                true
            }
            None => false,
        },
        Field::Currency => match detect_currency(value) {
            Some(currency) => {
                info.currency = currency;
                true
            }
            None => false,
        },
        Field::Date => {
            info.date = value.to_string();
            true
        }
        Field::Owner => {
            info.owner = value.to_string();
            true
        }
        Field::Manager => {
            info.manager = value.to_string();
            true
        }
        Field::AccountNumber => {
            info.account_number = value.to_string();
            true
        }
        Field::Custodian => {
            info.custodian = value.to_string();
            true
        }
        Field::Benchmark => {
            info.benchmark = value.to_string();
            true
        }
        Field::Strategy => {
            info.strategy = value.to_string();
            true
        }
    }
}

// --- Main Extractor Structure ---

/// Finds document-level facts: title, date, stated total, owner and so on.
pub struct PortfolioInfoExtractor {
    default_currency: String,
}

impl PortfolioInfoExtractor {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    fn empty_info(&self) -> PortfolioInfo {
        PortfolioInfo {
            currency: self.default_currency.clone(),
            ..PortfolioInfo::default()
        }
    }

    /// Key/value tables: a label column plus a value column.
    fn is_key_value_table(table: &Table) -> bool {
        table.headers.len() >= 2
            && table
                .rows
                .iter()
                .filter(|row| field_for_label(&row[0]).is_some())
                .count()
                >= MIN_KEY_VALUE_LABELS
    }

    fn find_title(text: &str) -> Option<String> {
        let candidates: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(TITLE_SEARCH_LINES)
            .collect();

        // Pattern 1: a title-keyword line that is not a "Label: value" line
        let keyword_line = candidates.iter().find(|l| {
            TITLE_KEYWORD_RE.is_match(l) && !l.contains(':') && l.len() <= MAX_TITLE_CHARS
        });
        // Pattern 2: the first line that is not a label or a table row
        keyword_line
            .or_else(|| {
                candidates
                    .iter()
                    .find(|l| l.len() <= MAX_TITLE_CHARS && !l.contains(':') && !l.contains('|'))
            })
            .map(|l| l.to_string())
    }

    fn find_date(text: &str) -> Option<String> {
        DATE_RES
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
    }

    /// Stated total and the currency it was printed in, if any.
    fn find_total_value(text: &str) -> Option<(f64, Option<String>)> {
        TOTAL_VALUE_RES.iter().find_map(|re| {
            let caps = re.captures(text)?;
            let total = parse_number(caps.name("num")?.as_str())?;
            let currency = caps
                .name("cur")
                .or_else(|| caps.name("code"))
                .and_then(|m| normalize_currency(m.as_str()));
            Some((total, currency))
        })
    }

    fn find_currency(text: &str) -> Option<String> {
        CURRENCY_RES
            .iter()
            .filter_map(|re| re.captures(text))
            .find_map(|caps| caps.get(1).and_then(|m| normalize_currency(m.as_str())))
    }

    /// Fills empty fields from free text. Returns true if anything was found.
    fn fill_from_text(&self, info: &mut PortfolioInfo, text: &str, currency_known: bool) -> bool {
        let mut found = false;

        if info.title.is_empty() {
            if let Some(title) = Self::find_title(text) {
                info.title = title;
                found = true;
            }
        }
        if info.date.is_empty() {
            if let Some(date) = Self::find_date(text) {
                info.date = date;
                found = true;
            }
        }

        let mut currency_known = currency_known;
        if let Some(currency) = Self::find_currency(text).filter(|_| !currency_known) {
            info.currency = currency;
            currency_known = true;
            found = true;
        }
        if info.total_value.is_none() {
            if let Some((total, currency)) = Self::find_total_value(text) {
                info.total_value = Some(total);
                if let Some(currency) = currency.filter(|_| !currency_known) {
                    info.currency = currency;
                }
                found = true;
            }
        }

        for (field, re) in LABELLED_RES.iter() {
            let is_empty = match field {
                Field::Owner => info.owner.is_empty(),
                Field::Manager => info.manager.is_empty(),
                Field::AccountNumber => info.account_number.is_empty(),
                Field::Custodian => info.custodian.is_empty(),
                Field::Benchmark => info.benchmark.is_empty(),
                Field::Strategy => info.strategy.is_empty(),
                _ => false,
            };
            if !is_empty {
                continue;
            }
            if let Some(value) = re.captures(text).and_then(|c| c.get(1)) {
                found |= set_field(info, *field, value.as_str());
            }
        }

        found
    }

    /// Table pass, then text pass for whatever the tables left empty.
    pub fn extract_info(&self, text: &str, tables: &[Table]) -> Extracted<PortfolioInfo> {
        let from_tables = self.from_tables(tables);
        let source = if from_tables.is_some() {
            ExtractionSource::Table
        } else {
            ExtractionSource::Text
        };

        let mut info = from_tables.unwrap_or_else(|| self.empty_info());
        let currency_known = source == ExtractionSource::Table && info.currency != self.default_currency;
        let found_in_text = self.fill_from_text(&mut info, text, currency_known);

        if source == ExtractionSource::Table || found_in_text {
            Extracted { value: info, source }
        } else {
            tracing::debug!("portfolio info not found by structural passes");
            Extracted {
                value: self.empty_info(),
                source: ExtractionSource::None,
            }
        }
    }
}

impl EntityExtractor for PortfolioInfoExtractor {
    type Output = PortfolioInfo;

    fn category(&self) -> &'static str {
        "portfolio info"
    }

    fn from_tables(&self, tables: &[Table]) -> Option<PortfolioInfo> {
        let mut info = self.empty_info();
        let mut found = false;

        for table in tables.iter().filter(|t| Self::is_key_value_table(t)) {
            tracing::trace!("Reading key/value table '{}'", table.title);
            for row in &table.rows {
                let Some(field) = field_for_label(&row[0]) else {
                    continue;
                };
                // First non-empty cell after the label holds the value
                let Some(value) = row[1..].iter().find(|c| !c.trim().is_empty()) else {
                    continue;
                };
                found |= set_field(&mut info, field, value);
            }
        }

        found.then_some(info)
    }

    fn from_text(&self, text: &str) -> Option<PortfolioInfo> {
        let mut info = self.empty_info();
        self.fill_from_text(&mut info, text, false).then_some(info)
    }

    fn extract(&self, text: &str, tables: &[Table]) -> Extracted<PortfolioInfo> {
        self.extract_info(text, tables)
    }
}
