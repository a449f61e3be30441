//! Knowledge-base document loading.
//!
//! Walks a directory tree and extracts plain text from `.txt`, `.md`,
//! `.pdf`, and `.docx` files. A file that cannot be read or converted is
//! logged and skipped; one corrupt file never aborts the load. PDF text
//! comes from the `pdftotext` external tool and DOCX text from the
//! document XML inside the archive, so both degrade to skip-with-warning
//! when the host tooling is missing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Loads documents from a knowledge-base directory.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    /// Create a new loader.
    pub fn new() -> Self {
        Self
    }

    /// Load every supported document under `dir`, in path order.
    ///
    /// Unsupported extensions are skipped quietly; extraction failures are
    /// logged and skipped. Documents that extract to empty text are kept
    /// (they chunk to nothing downstream).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `dir` does not exist or is not
    /// a directory.
    pub fn load_directory(&self, dir: &Path) -> Result<Vec<Document>> {
        if !dir.is_dir() {
            return Err(RagError::ConfigError(format!(
                "knowledge-base directory not found: {}",
                dir.display()
            )));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s.to_ascii_lowercase())
                .unwrap_or_default();

            let extracted = match extension.as_str() {
                "txt" | "md" => read_text(path),
                "pdf" => extract_pdf(path),
                "docx" => extract_docx(path),
                _ => {
                    debug!(path = %path.display(), "skipping unsupported file type");
                    continue;
                }
            };

            match extracted {
                Ok(text) => {
                    let id = document_id(dir, path);
                    let metadata =
                        HashMap::from([("source".to_string(), id.clone())]);
                    documents.push(Document {
                        id,
                        source_path: path.to_path_buf(),
                        text,
                        metadata,
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable document");
                }
            }
        }

        info!(dir = %dir.display(), count = documents.len(), "loaded knowledge base");
        Ok(documents)
    }
}

/// Derive a document ID from the path relative to the knowledge-base root.
fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/")
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|source| RagError::Io { path: path.to_path_buf(), source })
}

/// Extract PDF text by piping through the `pdftotext` tool.
fn extract_pdf(path: &Path) -> Result<String> {
    let output = Command::new("pdftotext")
        .arg(path)
        .arg("-")
        .output()
        .map_err(|source| RagError::Io { path: path.to_path_buf(), source })?;

    if !output.status.success() {
        return Err(RagError::ConfigError(format!(
            "pdftotext failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract DOCX text from the `word/document.xml` entry of the archive.
fn extract_docx(path: &Path) -> Result<String> {
    let output = Command::new("unzip")
        .arg("-p")
        .arg(path)
        .arg("word/document.xml")
        .output()
        .map_err(|source| RagError::Io { path: path.to_path_buf(), source })?;

    if !output.status.success() {
        return Err(RagError::ConfigError(format!(
            "unzip failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(strip_document_xml(&String::from_utf8_lossy(&output.stdout)))
}

/// Reduce WordprocessingML to plain text: paragraphs become newlines,
/// tabs are preserved, all other tags are dropped, and the basic XML
/// entities are decoded.
fn strip_document_xml(xml: &str) -> String {
    let xml = xml.replace("</w:p>", "\n").replace("<w:tab/>", "\t");

    let mut text = String::with_capacity(xml.len() / 2);
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wordprocessing_markup() {
        let xml = r#"<?xml version="1.0"?><w:document><w:body><w:p><w:r><w:t>A PID controller</w:t></w:r></w:p><w:p><w:r><w:t>has three terms &amp; one output.</w:t></w:r></w:p></w:body></w:document>"#;
        let text = strip_document_xml(xml);
        assert_eq!(text, "A PID controller\nhas three terms & one output.");
    }

    #[test]
    fn tabs_survive_extraction() {
        let xml = "<w:p><w:t>Kp</w:t><w:tab/><w:t>gain</w:t></w:p>";
        assert_eq!(strip_document_xml(xml), "Kp\tgain");
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let loader = DocumentLoader::new();
        let err = loader.load_directory(Path::new("/nonexistent/kb")).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn loads_text_files_and_skips_unknown_types() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "open-loop control").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let documents = DocumentLoader::new().load_directory(dir.path()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "notes.txt");
        assert_eq!(documents[0].text, "open-loop control");
        assert_eq!(documents[0].metadata["source"], "notes.txt");
    }

    #[test]
    fn corrupt_file_does_not_abort_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "stable system").unwrap();
        // Invalid UTF-8 forces a read failure for this entry only.
        std::fs::write(dir.path().join("bad.txt"), [0xff, 0xfe, 0xfd]).unwrap();

        let documents = DocumentLoader::new().load_directory(dir.path()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "good.txt");
    }
}
