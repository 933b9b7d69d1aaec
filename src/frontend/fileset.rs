// Purpose: Map file ids to file names so spans resolve to reportable positions.
// Inputs/Outputs: Files register once per parse; Position carries name/line/column/offset.
// Invariants: FileIds are stable for the lifetime of the owning parsed package.
// Gotchas: Spans are file-relative; a Position is only meaningful with the right FileId.

use std::path::{Path, PathBuf};

use super::ast::Span;

pub type FileId = usize;

/// Position table shared by every file of one parsed package.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub filename: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn is_valid(&self) -> bool {
        !self.filename.is_empty() && self.line > 0
    }
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl AsRef<Path>) -> FileId {
        self.files.push(name.as_ref().to_path_buf());
        self.files.len() - 1
    }

    pub fn file_name(&self, id: FileId) -> Option<&Path> {
        self.files.get(id).map(|p| p.as_path())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn position(&self, id: FileId, span: &Span) -> Position {
        let filename = self
            .file_name(id)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Position {
            filename,
            offset: span.start,
            line: span.line,
            column: span.column,
        }
    }
}
