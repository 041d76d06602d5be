//! Pair resolution between the original and printer document sets
//!
//! Files are matched by their pairing code (see [`crate::identifier`]).
//! Matching is first-match in printer-set order: when two printer files share
//! an original's code, the earlier one is paired and the later one is dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::identifier::extract_code_from_path;

/// File extensions accepted as documents during discovery
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Pairing/discovery error types
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("Folder not found: {0}")]
    FolderNotFound(PathBuf),

    #[error("Not a folder: {0}")]
    NotAFolder(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A discovered document and its pairing code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFile {
    pub path: PathBuf,
    pub code: String,
}

impl DocumentFile {
    /// Create a document, deriving its code from the file name
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let code = extract_code_from_path(&path);
        Self { path, code }
    }

    /// Base file name for display
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Which sides of a pair are present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    Both,
    OriginalOnly,
    PrinterOnly,
}

impl MatchKind {
    /// Label used in reports
    pub fn label(self) -> &'static str {
        match self {
            MatchKind::Both => "Both files",
            MatchKind::OriginalOnly => "Original only",
            MatchKind::PrinterOnly => "Printer only",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An original/printer pair sharing a code. At least one side is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pair {
    code: String,
    original: Option<DocumentFile>,
    printer: Option<DocumentFile>,
    match_kind: MatchKind,
}

impl Pair {
    /// Pair with both sides present
    pub fn both(original: DocumentFile, printer: DocumentFile) -> Self {
        Self {
            code: original.code.clone(),
            original: Some(original),
            printer: Some(printer),
            match_kind: MatchKind::Both,
        }
    }

    /// Original file without a printer counterpart
    pub fn original_only(original: DocumentFile) -> Self {
        Self {
            code: original.code.clone(),
            original: Some(original),
            printer: None,
            match_kind: MatchKind::OriginalOnly,
        }
    }

    /// Printer file without an original counterpart
    pub fn printer_only(printer: DocumentFile) -> Self {
        Self {
            code: printer.code.clone(),
            original: None,
            printer: Some(printer),
            match_kind: MatchKind::PrinterOnly,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn original(&self) -> Option<&DocumentFile> {
        self.original.as_ref()
    }

    pub fn printer(&self) -> Option<&DocumentFile> {
        self.printer.as_ref()
    }

    pub fn match_kind(&self) -> MatchKind {
        self.match_kind
    }

    /// Whether both sides are present and can be scored
    pub fn is_matched(&self) -> bool {
        self.match_kind == MatchKind::Both
    }

    /// File name shown for the pair (original side preferred)
    pub fn display_name(&self) -> String {
        self.original
            .as_ref()
            .or(self.printer.as_ref())
            .map(DocumentFile::file_name)
            .unwrap_or_default()
    }
}

/// Resolves two document sets into ordered pairs
pub struct PairResolver;

impl PairResolver {
    /// Resolve pairs.
    ///
    /// Output order: one pair per original file in original-set order, then
    /// printer-only pairs in printer-set order.
    pub fn resolve(originals: &[PathBuf], printers: &[PathBuf]) -> Vec<Pair> {
        let printer_docs: Vec<DocumentFile> = printers.iter().map(DocumentFile::new).collect();
        Self::warn_duplicate_codes(&printer_docs);

        let mut processed: HashSet<String> = HashSet::new();
        let mut pairs = Vec::with_capacity(originals.len() + printer_docs.len());

        for path in originals {
            let original = DocumentFile::new(path);
            processed.insert(original.code.clone());

            match printer_docs.iter().find(|p| p.code == original.code) {
                Some(printer) => pairs.push(Pair::both(original, printer.clone())),
                None => pairs.push(Pair::original_only(original)),
            }
        }

        for printer in printer_docs {
            if !processed.contains(&printer.code) {
                pairs.push(Pair::printer_only(printer));
            }
        }

        pairs
    }

    fn warn_duplicate_codes(docs: &[DocumentFile]) {
        let mut seen = HashSet::new();
        for doc in docs {
            if !seen.insert(doc.code.as_str()) {
                warn!(
                    code = %doc.code,
                    file = %doc.path.display(),
                    "duplicate pairing code in printer set; only the first file is matched"
                );
            }
        }
    }
}

/// Recursively collect document files under `root`, sorted by path
pub fn discover_documents(root: &Path) -> Result<Vec<PathBuf>, PairingError> {
    if !root.exists() {
        return Err(PairingError::FolderNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(PairingError::NotAFolder(root.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_documents(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_documents(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), PairingError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_documents(&path, files)?;
        } else if path.is_file() && is_document(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Whether a path has a supported document extension (case-insensitive)
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.as_str()))
}
