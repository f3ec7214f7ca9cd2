// src/fallback/prompts.rs

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn document_excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn tables_prompt(excerpt: &str) -> String {
    format!(
        r#"You are extracting tables from a financial portfolio statement.

Find every table in the document text below (holdings, asset allocation, performance, account details).

Return ONLY valid JSON (no markdown, no explanation) with this structure:
{{
  "tables": [
    {{
      "title": "table title or section heading",
      "headers": ["column 1", "column 2"],
      "rows": [["cell", "cell"]]
    }}
  ]
}}

Rules:
- Every row must have the same number of cells as headers
- Copy numbers exactly as printed
- If there are no tables, return {{"tables": []}}

Document text:
{excerpt}"#,
        excerpt = excerpt
    )
}

pub fn securities_prompt(excerpt: &str) -> String {
    format!(
        r#"You are extracting securities holdings from a financial portfolio statement.

Find every individual security position in the document text below.

Return ONLY valid JSON (no markdown, no explanation) with this structure:
{{
  "securities": [
    {{
      "isin": "12-character ISIN or null",
      "name": "security name or null",
      "quantity": number or null,
      "price": number or null,
      "value": number or null,
      "currency": "ISO currency code or null"
    }}
  ]
}}

Rules:
- Include a position only if it has a name or an ISIN
- Numbers without thousands separators or currency symbols
- If there are no holdings, return {{"securities": []}}

Document text:
{excerpt}"#,
        excerpt = excerpt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(document_excerpt("€€€€", 2), "€€");
        assert_eq!(document_excerpt("short", 100), "short");
        assert_eq!(document_excerpt("abc", 0), "");
    }

    #[test]
    fn prompts_embed_excerpt_and_shape() {
        let prompt = securities_prompt("Apple Inc. US0378331005");
        assert!(prompt.contains("Apple Inc. US0378331005"));
        assert!(prompt.contains("\"securities\""));
        assert!(tables_prompt("x").contains("\"tables\": []"));
    }
}
