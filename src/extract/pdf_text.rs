use log::{debug, warn};
use lopdf::Document;
use std::path::Path;

use super::ExtractError;

#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number.
    pub number: usize,
    pub text: String,
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Extracts text page by page. A page whose content cannot be decoded comes
/// back empty rather than failing the document.
pub fn read_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    let mut pages = Vec::new();
    for (number, _page_id) in doc.get_pages() {
        let text = match doc.extract_text(&[number]) {
            Ok(t) => t,
            Err(e) => {
                warn!("page {}: text could not be decoded: {}", number, e);
                String::new()
            }
        };
        debug!("page {}: {} chars", number, text.len());
        pages.push(PageText {
            number: number as usize,
            text,
        });
    }
    Ok(pages)
}
