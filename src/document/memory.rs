//! In-memory document host.
//!
//! Edits are queued and only applied on `sync`, like a batched office host.
//! A [`FaultPlan`] makes chosen edit kinds fail at sync time so callers can
//! exercise partial-failure paths deterministically.

use serde::Serialize;
use std::fmt::Write as _;

use super::host::{DocumentHost, FieldKind, HostError, ParagraphRef, Story, TableRef};
use super::style::{CellStyle, ParagraphStyle, TableStyle};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Run {
    Text { text: String },
    Field { field: FieldKind },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paragraph {
    pub id: u64,
    pub runs: Vec<Run>,
    pub style: ParagraphStyle,
}

impl Paragraph {
    /// Text with fields shown as `{ CODE }`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            match run {
                Run::Text { text } => out.push_str(text),
                Run::Field { field } => {
                    let _ = write!(out, "{{ {} }}", field.code());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub text: String,
    pub style: Option<CellStyle>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub id: u64,
    pub style: TableStyle,
    pub cells: Vec<Vec<Cell>>,
}

impl Table {
    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    pub fn row_text(&self, row: usize) -> Vec<&str> {
        self.cells
            .get(row)
            .map(|r| r.iter().map(|c| c.text.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
    PageBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Clear,
    Paragraph,
    Text,
    Field,
    Table,
    Cell,
    PageBreak,
}

#[derive(Debug, Clone)]
enum Edit {
    Clear(Story),
    Paragraph {
        story: Story,
        id: u64,
        text: String,
        style: ParagraphStyle,
    },
    Text {
        paragraph: ParagraphRef,
        text: String,
    },
    Field {
        paragraph: ParagraphRef,
        field: FieldKind,
    },
    Table {
        id: u64,
        rows: usize,
        cols: usize,
        style: TableStyle,
    },
    Cell {
        table: TableRef,
        row: usize,
        col: usize,
        text: String,
        style: CellStyle,
    },
    PageBreak,
}

/// Deterministic failures for a [`MemoryDocument`].
#[derive(Debug, Clone)]
pub struct FaultPlan {
    failures: Vec<(EditKind, Option<Story>)>,
    fields_supported: bool,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self::none()
    }
}

impl FaultPlan {
    pub fn none() -> Self {
        Self {
            failures: Vec::new(),
            fields_supported: true,
        }
    }

    /// Fail every `kind` edit (optionally only in `story`) when it is synced.
    pub fn fail(mut self, kind: EditKind, story: Option<Story>) -> Self {
        self.failures.push((kind, story));
        self
    }

    /// Reject field insertion outright.
    pub fn without_fields(mut self) -> Self {
        self.fields_supported = false;
        self
    }

    fn should_fail(&self, kind: EditKind, story: Story) -> bool {
        self.failures
            .iter()
            .any(|(k, s)| *k == kind && s.map_or(true, |s| s == story))
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MemoryDocument {
    header: Vec<Block>,
    footer: Vec<Block>,
    body: Vec<Block>,
    #[serde(skip)]
    pending: Vec<Edit>,
    #[serde(skip)]
    next_id: u64,
    #[serde(skip)]
    syncs: usize,
    #[serde(skip)]
    faults: FaultPlan,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    pub fn story(&self, story: Story) -> &[Block] {
        match story {
            Story::Body => &self.body,
            Story::Header => &self.header,
            Story::Footer => &self.footer,
        }
    }

    pub fn paragraphs(&self, story: Story) -> impl Iterator<Item = &Paragraph> {
        self.story(story).iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            _ => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.body.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn pending_edits(&self) -> usize {
        self.pending.len()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs
    }

    /// Plain-text rendering: cells tab-separated, page breaks as form feeds.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (label, blocks) in [
            ("[header]", &self.header),
            ("[body]", &self.body),
            ("[footer]", &self.footer),
        ] {
            if blocks.is_empty() {
                continue;
            }
            out.push_str(label);
            out.push('\n');
            for block in blocks {
                match block {
                    Block::Paragraph(p) => {
                        out.push_str(&p.text());
                        out.push('\n');
                    }
                    Block::Table(t) => {
                        for row in 0..t.rows() {
                            out.push_str(&t.row_text(row).join(" | "));
                            out.push('\n');
                        }
                    }
                    Block::PageBreak => out.push('\u{c}'),
                }
            }
        }
        out
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn blocks_mut(&mut self, story: Story) -> &mut Vec<Block> {
        match story {
            Story::Body => &mut self.body,
            Story::Header => &mut self.header,
            Story::Footer => &mut self.footer,
        }
    }

    fn find_paragraph(&mut self, id: u64) -> Option<(Story, &mut Paragraph)> {
        let stories = [
            (Story::Body, &mut self.body),
            (Story::Header, &mut self.header),
            (Story::Footer, &mut self.footer),
        ];
        for (story, blocks) in stories {
            for block in blocks.iter_mut() {
                if let Block::Paragraph(p) = block {
                    if p.id == id {
                        return Some((story, p));
                    }
                }
            }
        }
        None
    }

    fn find_table(&mut self, id: u64) -> Option<&mut Table> {
        self.body.iter_mut().find_map(|b| match b {
            Block::Table(t) if t.id == id => Some(t),
            _ => None,
        })
    }

    fn check(&self, kind: EditKind, story: Story) -> Result<(), HostError> {
        if self.faults.should_fail(kind, story) {
            return Err(HostError::EditFailed(format!(
                "{:?} in {:?} rejected by host",
                kind, story
            )));
        }
        Ok(())
    }

    fn apply(&mut self, edit: Edit) -> Result<(), HostError> {
        match edit {
            Edit::Clear(story) => {
                self.check(EditKind::Clear, story)?;
                self.blocks_mut(story).clear();
            }
            Edit::Paragraph {
                story,
                id,
                text,
                style,
            } => {
                self.check(EditKind::Paragraph, story)?;
                self.blocks_mut(story).push(Block::Paragraph(Paragraph {
                    id,
                    runs: vec![Run::Text { text }],
                    style,
                }));
            }
            Edit::Text { paragraph, text } => {
                let story = self.paragraph_story(paragraph)?;
                self.check(EditKind::Text, story)?;
                if let Some((_, p)) = self.find_paragraph(paragraph.0) {
                    p.runs.push(Run::Text { text });
                }
            }
            Edit::Field { paragraph, field } => {
                let story = self.paragraph_story(paragraph)?;
                self.check(EditKind::Field, story)?;
                if let Some((_, p)) = self.find_paragraph(paragraph.0) {
                    p.runs.push(Run::Field { field });
                }
            }
            Edit::Table {
                id,
                rows,
                cols,
                style,
            } => {
                self.check(EditKind::Table, Story::Body)?;
                let cells = (0..rows)
                    .map(|_| {
                        (0..cols)
                            .map(|_| Cell {
                                text: String::new(),
                                style: None,
                            })
                            .collect()
                    })
                    .collect();
                self.body.push(Block::Table(Table { id, style, cells }));
            }
            Edit::Cell {
                table,
                row,
                col,
                text,
                style,
            } => {
                self.check(EditKind::Cell, Story::Body)?;
                let t = self.find_table(table.0).ok_or(HostError::UnknownRef {
                    kind: "table",
                    id: table.0,
                })?;
                let (rows, cols) = (t.rows(), t.cols());
                let cell = t
                    .cells
                    .get_mut(row)
                    .and_then(|r| r.get_mut(col))
                    .ok_or(HostError::CellOutOfRange {
                        row,
                        col,
                        rows,
                        cols,
                    })?;
                cell.text = text;
                cell.style = Some(style);
            }
            Edit::PageBreak => {
                self.check(EditKind::PageBreak, Story::Body)?;
                self.body.push(Block::PageBreak);
            }
        }
        Ok(())
    }

    fn paragraph_story(&mut self, paragraph: ParagraphRef) -> Result<Story, HostError> {
        self.find_paragraph(paragraph.0)
            .map(|(story, _)| story)
            .ok_or(HostError::UnknownRef {
                kind: "paragraph",
                id: paragraph.0,
            })
    }
}

impl DocumentHost for MemoryDocument {
    fn clear(&mut self, story: Story) -> Result<(), HostError> {
        self.pending.push(Edit::Clear(story));
        Ok(())
    }

    fn append_paragraph(
        &mut self,
        story: Story,
        text: &str,
        style: &ParagraphStyle,
    ) -> Result<ParagraphRef, HostError> {
        let id = self.allocate();
        self.pending.push(Edit::Paragraph {
            story,
            id,
            text: text.to_string(),
            style: *style,
        });
        Ok(ParagraphRef(id))
    }

    fn append_text(&mut self, paragraph: ParagraphRef, text: &str) -> Result<(), HostError> {
        self.pending.push(Edit::Text {
            paragraph,
            text: text.to_string(),
        });
        Ok(())
    }

    fn append_field(&mut self, paragraph: ParagraphRef, field: FieldKind) -> Result<(), HostError> {
        if !self.faults.fields_supported {
            return Err(HostError::Unsupported("field insertion"));
        }
        self.pending.push(Edit::Field { paragraph, field });
        Ok(())
    }

    fn append_table(
        &mut self,
        rows: usize,
        cols: usize,
        style: &TableStyle,
    ) -> Result<TableRef, HostError> {
        let id = self.allocate();
        self.pending.push(Edit::Table {
            id,
            rows,
            cols,
            style: *style,
        });
        Ok(TableRef(id))
    }

    fn set_cell(
        &mut self,
        table: TableRef,
        row: usize,
        col: usize,
        text: &str,
        style: &CellStyle,
    ) -> Result<(), HostError> {
        self.pending.push(Edit::Cell {
            table,
            row,
            col,
            text: text.to_string(),
            style: *style,
        });
        Ok(())
    }

    fn append_page_break(&mut self) -> Result<(), HostError> {
        self.pending.push(Edit::PageBreak);
        Ok(())
    }

    /// Applies queued edits in order. The first failing edit aborts the
    /// batch; edits after it are discarded, edits before it stay applied.
    fn sync(&mut self) -> Result<(), HostError> {
        self.syncs += 1;
        let pending = std::mem::take(&mut self.pending);
        for edit in pending {
            self.apply(edit)
                .map_err(|e| HostError::SyncFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::style::{StyleRole, TableRole};

    #[test]
    fn test_edits_wait_for_sync() {
        let mut doc = MemoryDocument::new();
        let style = StyleRole::BodyText.paragraph();
        doc.append_paragraph(Story::Body, "hello", &style).unwrap();
        assert_eq!(doc.story(Story::Body).len(), 0);
        assert_eq!(doc.pending_edits(), 1);
        doc.sync().unwrap();
        assert_eq!(doc.paragraphs(Story::Body).next().unwrap().text(), "hello");
        assert_eq!(doc.pending_edits(), 0);
    }

    #[test]
    fn test_runs_and_fields() {
        let mut doc = MemoryDocument::new();
        let style = StyleRole::HeaderFooter.paragraph();
        let p = doc.append_paragraph(Story::Footer, "Page ", &style).unwrap();
        doc.append_field(p, FieldKind::Page).unwrap();
        doc.append_text(p, " of ").unwrap();
        doc.append_field(p, FieldKind::NumPages).unwrap();
        doc.sync().unwrap();
        let footer = doc.paragraphs(Story::Footer).next().unwrap();
        assert_eq!(footer.text(), "Page { PAGE } of { NUMPAGES }");
    }

    #[test]
    fn test_fault_discards_rest_of_batch() {
        let mut doc =
            MemoryDocument::with_faults(FaultPlan::none().fail(EditKind::Paragraph, Some(Story::Header)));
        let style = StyleRole::BodyText.paragraph();
        doc.append_paragraph(Story::Body, "kept", &style).unwrap();
        doc.append_paragraph(Story::Header, "rejected", &style).unwrap();
        doc.append_paragraph(Story::Body, "dropped", &style).unwrap();
        assert!(matches!(doc.sync(), Err(HostError::SyncFailed(_))));
        let body: Vec<String> = doc.paragraphs(Story::Body).map(Paragraph::text).collect();
        assert_eq!(body, vec!["kept".to_string()]);
        assert_eq!(doc.pending_edits(), 0);
    }

    #[test]
    fn test_fields_unsupported() {
        let mut doc = MemoryDocument::with_faults(FaultPlan::none().without_fields());
        let style = StyleRole::HeaderFooter.paragraph();
        let p = doc.append_paragraph(Story::Footer, "Page ", &style).unwrap();
        assert_eq!(
            doc.append_field(p, FieldKind::Page),
            Err(HostError::Unsupported("field insertion"))
        );
    }

    #[test]
    fn test_table_cells() {
        let mut doc = MemoryDocument::new();
        let table_style = TableRole::Overview.table();
        let t = doc.append_table(2, 2, &table_style).unwrap();
        doc.set_cell(t, 1, 1, "x", &table_style.cell()).unwrap();
        doc.sync().unwrap();
        let table = doc.tables().next().unwrap();
        assert_eq!((table.rows(), table.cols()), (2, 2));
        assert_eq!(table.row_text(1), vec!["", "x"]);

        doc.set_cell(t, 5, 0, "y", &table_style.cell()).unwrap();
        assert!(doc.sync().is_err());
    }

    #[test]
    fn test_clear_and_json() {
        let mut doc = MemoryDocument::new();
        let style = StyleRole::BodyText.paragraph();
        doc.append_paragraph(Story::Body, "old", &style).unwrap();
        doc.sync().unwrap();
        doc.clear(Story::Body).unwrap();
        doc.append_page_break().unwrap();
        doc.sync().unwrap();
        assert_eq!(doc.story(Story::Body), &[Block::PageBreak]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["body"][0]["block"], "page_break");
        assert_eq!(doc.sync_count(), 2);
    }
}
