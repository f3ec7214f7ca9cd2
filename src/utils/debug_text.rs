// src/utils/debug_text.rs
use std::fs;
use std::path::Path;

use crate::document::TableRegion;
use crate::utils::error::AppError;

/// Renders `text` with `>>>`/`<<<` marker lines around every detected region.
pub fn annotate_regions(text: &str, regions: &[TableRegion]) -> String {
    let mut sorted: Vec<&TableRegion> = regions.iter().collect();
    sorted.sort_by_key(|r| r.start_line);

    let mut out = String::with_capacity(text.len() + regions.len() * 64);
    let mut next = sorted.iter().peekable();
    let mut open: Option<&TableRegion> = None;

    for (idx, line) in text.lines().enumerate() {
        if let Some(region) = next.next_if(|r| r.start_line == idx) {
            out.push_str(&format!(
                ">>> TABLE '{}' (lines {}-{})\n",
                region.title,
                region.start_line + 1,
                region.end_line + 1
            ));
            open = Some(*region);
        }
        out.push_str(line);
        out.push('\n');
        if let Some(region) = open.filter(|r| r.end_line == idx) {
            out.push_str(&format!("<<< END '{}'\n", region.title));
            open = None;
        }
    }
    out
}

/// Writes an annotated copy of the document text for inspecting region detection.
pub fn create_debug_text(text: &str, regions: &[TableRegion], filename: &Path) -> Result<(), AppError> {
    if let Some(parent) = filename.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(filename, annotate_regions(text, regions))?;
    tracing::info!(
        "Saved debug text with {} marked region(s) to {}",
        regions.len(),
        filename.display()
    );
    Ok(())
}
