//! The document host boundary.
//!
//! Hosts queue edits and only commit them to the live document on
//! [`DocumentHost::sync`]. Errors in queued edits therefore surface at the
//! next sync; errors returned directly from an edit call mean the host cannot
//! perform that kind of edit at all.

use serde::Serialize;
use thiserror::Error;

use super::style::{CellStyle, ParagraphStyle, TableStyle};

/// Which part of the document an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Story {
    Body,
    Header,
    Footer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    Page,
    NumPages,
}

impl FieldKind {
    pub fn code(&self) -> &'static str {
        match self {
            FieldKind::Page => "PAGE",
            FieldKind::NumPages => "NUMPAGES",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ParagraphRef(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
    #[error("edit failed: {0}")]
    EditFailed(String),
    #[error("sync failed: {0}")]
    SyncFailed(String),
    #[error("unknown {kind} reference {id}")]
    UnknownRef { kind: &'static str, id: u64 },
    #[error("cell ({row}, {col}) outside {rows}x{cols} table")]
    CellOutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

pub trait DocumentHost {
    fn clear(&mut self, story: Story) -> Result<(), HostError>;

    /// Append a paragraph to the end of `story`.
    fn append_paragraph(
        &mut self,
        story: Story,
        text: &str,
        style: &ParagraphStyle,
    ) -> Result<ParagraphRef, HostError>;

    /// Append a text run to the end of an existing paragraph.
    fn append_text(&mut self, paragraph: ParagraphRef, text: &str) -> Result<(), HostError>;

    /// Append a dynamic field to the end of an existing paragraph.
    fn append_field(&mut self, paragraph: ParagraphRef, field: FieldKind) -> Result<(), HostError>;

    /// Append an empty `rows` x `cols` table to the body.
    fn append_table(
        &mut self,
        rows: usize,
        cols: usize,
        style: &TableStyle,
    ) -> Result<TableRef, HostError>;

    fn set_cell(
        &mut self,
        table: TableRef,
        row: usize,
        col: usize,
        text: &str,
        style: &CellStyle,
    ) -> Result<(), HostError>;

    fn append_page_break(&mut self) -> Result<(), HostError>;

    /// Commit queued edits.
    fn sync(&mut self) -> Result<(), HostError>;
}
