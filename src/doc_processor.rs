use crate::error::{RagError, Result};
use std::fs;
use std::path::Path;

/// Page separator used by text exports and by pdf-extract output.
const PAGE_BREAK: char = '\u{000C}';

/// Code points that PDF text extraction leaves behind and that carry no text.
const ARTIFACTS: &[char] = &[
    '\u{0000}', '\u{0002}', '\u{0003}', '\u{00AD}', '\u{FEFF}', '\u{FFFD}',
];

/// A loaded source document, one string per page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub name: String,
    pub pages: Vec<String>,
}

/// Unify line endings and strip extraction artifacts. Idempotent.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !ARTIFACTS.contains(c))
        .collect()
}

fn split_pages(content: &str) -> Vec<String> {
    content.split(PAGE_BREAK).map(str::to_string).collect()
}

/// Parse a document file into pages of plain text
pub fn parse_file(path: &Path) -> Result<SourceDocument> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RagError::Document(format!("Invalid file name: {}", path.display())))?
        .to_string();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let pages = match ext.as_str() {
        "txt" | "md" | "markdown" => split_pages(&fs::read_to_string(path)?),
        "pdf" => {
            let bytes = fs::read(path)?;
            let content = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| RagError::Document(format!("PDF parse error: {}", e)))?;
            split_pages(&content)
        }
        _ => return Err(RagError::Document(format!("Unsupported file type: .{}", ext))),
    };

    Ok(SourceDocument { name, pages })
}

/// Load every supported file directly under `dir`, sorted by file name.
///
/// Files that fail to parse are returned as errors alongside their path so the
/// caller can report them and keep going.
pub fn load_dir(dir: &Path) -> Result<Vec<std::result::Result<SourceDocument, (String, RagError)>>> {
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|p| parse_file(&p).map_err(|e| (p.display().to_string(), e)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings_and_artifacts() {
        let raw = "one\r\ntwo\rthree\u{00AD}\u{FEFF}\u{0000}";
        assert_eq!(normalize_text(raw), "one\ntwo\nthree");
    }

    #[test]
    fn test_normalize_idempotent() {
        let raw = "a\r\n\r\nb\u{FFFD} c\r";
        let once = normalize_text(raw);
        assert_eq!(normalize_text(&once), once);
    }

    #[test]
    fn test_parse_text_file_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first page\u{000C}second page").unwrap();

        let doc = parse_file(&path).unwrap();
        assert_eq!(doc.name, "notes.txt");
        assert_eq!(doc.pages, vec!["first page", "second page"]);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, [0u8; 4]).unwrap();
        assert!(matches!(parse_file(&path), Err(RagError::Document(_))));
    }

    #[test]
    fn test_load_dir_keeps_going_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("b.bin"), "beta").unwrap();
        fs::write(dir.path().join("c.md"), "gamma").unwrap();

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].as_ref().unwrap().name, "a.txt");
        assert!(loaded[1].is_err());
        assert_eq!(loaded[2].as_ref().unwrap().name, "c.md");
    }
}
