// src/fallback/schema.rs
//! Wire schema for generator responses and the lenient parsing around it.
//!
//! Generators wrap JSON in prose or code fences, return numbers as strings
//! and occasionally drop fields. Everything here validates before use:
//! items that do not fit the schema are skipped, a response with no usable
//! JSON at all is a `MalformedResponse`.

use serde::Deserialize;
use serde_json::Value;

use crate::document::{Security, Table};
use crate::utils::error::FallbackError;
use crate::utils::numbers::{detect_currency, is_valid_isin, parse_number};

/// A number the generator may have printed as `1250.5` or `"1,250.50"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberLike {
    Number(f64),
    Text(String),
}

impl NumberLike {
    pub fn value(&self) -> Option<f64> {
        match self {
            NumberLike::Number(n) if n.is_finite() => Some(*n),
            NumberLike::Number(_) => None,
            NumberLike::Text(s) => parse_number(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(default)]
    title: String,
    headers: Vec<Value>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSecurity {
    isin: Option<String>,
    name: Option<String>,
    quantity: Option<NumberLike>,
    price: Option<NumberLike>,
    value: Option<NumberLike>,
    currency: Option<String>,
}

/// Removes a surrounding ```json fence if the whole reply is fenced.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Finds the first balanced JSON object or array in `text`.
///
/// Brackets inside string literals do not count towards depth.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c == '{' || c == '[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Locates the list under `key`, accepting a bare top-level array as well.
fn response_items(response: &str, key: &str) -> Result<Vec<Value>, FallbackError> {
    let json = extract_json(strip_code_fences(response))
        .ok_or_else(|| FallbackError::MalformedResponse("no JSON found in response".to_string()))?;
    let parsed: Value = serde_json::from_str(json)
        .map_err(|e| FallbackError::MalformedResponse(format!("invalid JSON: {}", e)))?;

    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(FallbackError::MalformedResponse(format!("'{}' is not a list", key))),
            None => Err(FallbackError::MalformedResponse(format!("missing '{}' key", key))),
        },
        _ => Err(FallbackError::MalformedResponse("expected an object or array".to_string())),
    }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Parses a `{ "tables": [...] }` reply into well-formed tables.
pub fn parse_tables(response: &str) -> Result<Vec<Table>, FallbackError> {
    let tables = response_items(response, "tables")?
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawTable>(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::debug!("Skipping table that does not fit the schema: {}", e);
                None
            }
        })
        .filter_map(|raw| {
            let headers: Vec<String> = raw.headers.iter().map(cell_text).collect();
            let rows: Vec<Vec<String>> = raw
                .rows
                .iter()
                .map(|row| row.iter().map(cell_text).collect::<Vec<String>>())
                .filter(|row| row.iter().any(|c| !c.is_empty()))
                .collect();
            if headers.len() < 2 || rows.is_empty() {
                tracing::debug!("Skipping generated table '{}' without headers or rows", raw.title);
                return None;
            }
            Some(Table::new(raw.title, headers, rows))
        })
        .collect();
    Ok(tables)
}

/// Parses a `{ "securities": [...] }` reply. Entries need a name or an ISIN.
pub fn parse_securities(response: &str, default_currency: &str) -> Result<Vec<Security>, FallbackError> {
    let securities = response_items(response, "securities")?
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawSecurity>(item) {
            Ok(raw) => Some(raw),
            Err(e) => {
                tracing::debug!("Skipping security that does not fit the schema: {}", e);
                None
            }
        })
        .filter_map(|raw| {
            // Same acceptance rule as table rows: a name or a valid-looking ISIN
            let isin = raw
                .isin
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty());
            let has_name = raw.name.as_deref().is_some_and(|s| !s.trim().is_empty());
            if !has_name && !isin.as_deref().is_some_and(is_valid_isin) {
                return None;
            }
            let currency = raw
                .currency
                .as_deref()
                .and_then(detect_currency)
                .unwrap_or_else(|| default_currency.to_string());
            let mut security = Security::new(isin, raw.name, currency);
            security.quantity = raw.quantity.as_ref().and_then(NumberLike::value);
            security.price = raw.price.as_ref().and_then(NumberLike::value);
            security.value = raw.value.as_ref().and_then(NumberLike::value);
            Some(security)
        })
        .collect();
    Ok(securities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn extracts_balanced_json_from_prose() {
        let reply = "Sure! Here it is: {\"tables\": [{\"title\": \"a } b\"}]} Hope this helps.";
        assert_eq!(extract_json(reply), Some("{\"tables\": [{\"title\": \"a } b\"}]}"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{\"unterminated\": 1"), None);
    }

    #[test]
    fn parses_tables_and_drops_invalid_ones() {
        let reply = r#"```json
{"tables": [
  {"title": "Holdings", "headers": ["Name", "Value"], "rows": [["Apple", 19050], ["", null]]},
  {"title": "Single column", "headers": ["Name"], "rows": [["x"]]},
  {"title": "No headers"}
]}
```"#;
        let tables = parse_tables(reply).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].headers, vec!["Name", "Value"]);
        assert_eq!(tables[0].rows, vec![vec!["Apple".to_string(), "19050".to_string()]]);
    }

    #[test]
    fn parses_securities_with_stringly_numbers() {
        let reply = r#"{"securities": [
            {"isin": "us0378331005", "name": "Apple Inc.", "quantity": "100", "price": 190.5, "value": "19,050.00", "currency": "usd"},
            {"quantity": 5},
            {"name": "Bad Corp", "isin": "XX12345"},
            {"isin": "XX12345", "value": 10},
            {"isin": "GB0002634946"}
        ]}"#;
        let securities = parse_securities(reply, "EUR").unwrap();
        assert_eq!(securities.len(), 3);
        assert_eq!(securities[0].isin.as_deref(), Some("US0378331005"));
        assert!(securities[0].isin_valid);
        assert_eq!(securities[0].quantity, Some(100.0));
        assert_eq!(securities[0].price, Some(190.5));
        assert_eq!(securities[0].value, Some(19_050.0));
        assert_eq!(securities[0].currency, "USD");
        assert!(!securities[1].isin_valid);
        assert_eq!(securities[1].currency, "EUR");
        assert_eq!(securities[2].isin.as_deref(), Some("GB0002634946"));
        assert_eq!(securities[2].name, None);
    }

    #[test]
    fn malformed_replies_are_errors() {
        assert!(matches!(
            parse_securities("I could not find any securities.", "USD"),
            Err(FallbackError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_tables("{\"other\": []}"),
            Err(FallbackError::MalformedResponse(_))
        ));
    }
}
