//! Typography of the assembled document, keyed by semantic role.

use serde::Serialize;

pub const FONT_FAMILY: &str = "Times New Roman";
pub const BLACK: &str = "#000000";
pub const LINK_BLUE: &str = "#0000FF";
pub const TABLE_GRID: &str = "Table Grid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Centered,
    Right,
}

/// `None` fields leave the host's current value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Font {
    pub name: &'static str,
    pub size: f32,
    pub color: &'static str,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParagraphStyle {
    pub font: Font,
    pub alignment: Option<Alignment>,
    pub space_before: Option<f32>,
    pub space_after: Option<f32>,
    pub left_indent: Option<f32>,
}

impl ParagraphStyle {
    pub fn with_space_before(mut self, points: f32) -> Self {
        self.space_before = Some(points);
        self
    }

    pub fn with_space_after(mut self, points: f32) -> Self {
        self.space_after = Some(points);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleRole {
    MainTitle,
    SectionTitle,
    TableCaption,
    BodyText,
    HeaderFooter,
    Footnote,
    TocEntry,
}

const fn font(size: f32, color: &'static str, bold: Option<bool>, italic: Option<bool>) -> Font {
    Font {
        name: FONT_FAMILY,
        size,
        color,
        bold,
        italic,
    }
}

const fn para(font: Font, alignment: Alignment, before: f32, after: f32) -> ParagraphStyle {
    ParagraphStyle {
        font,
        alignment: Some(alignment),
        space_before: Some(before),
        space_after: Some(after),
        left_indent: None,
    }
}

const MAIN_TITLE: ParagraphStyle = para(font(14.0, BLACK, Some(true), None), Alignment::Centered, 0.0, 12.0);
const SECTION_TITLE: ParagraphStyle =
    para(font(14.0, BLACK, Some(true), Some(false)), Alignment::Left, 0.0, 12.0);
const TABLE_CAPTION: ParagraphStyle =
    para(font(12.0, BLACK, Some(true), Some(false)), Alignment::Left, 12.0, 6.0);
const BODY_TEXT: ParagraphStyle =
    para(font(12.0, BLACK, Some(false), Some(false)), Alignment::Left, 0.0, 6.0);
const HEADER_FOOTER: ParagraphStyle =
    para(font(11.0, BLACK, Some(false), Some(false)), Alignment::Left, 0.0, 0.0);
const FOOTNOTE: ParagraphStyle =
    para(font(9.0, BLACK, Some(false), Some(true)), Alignment::Left, 6.0, 12.0);
const TOC_ENTRY: ParagraphStyle = ParagraphStyle {
    left_indent: Some(0.0),
    ..para(font(12.0, LINK_BLUE, Some(false), None), Alignment::Left, 0.0, 0.0)
};

impl StyleRole {
    pub fn paragraph(self) -> ParagraphStyle {
        match self {
            StyleRole::MainTitle => MAIN_TITLE,
            StyleRole::SectionTitle => SECTION_TITLE,
            StyleRole::TableCaption => TABLE_CAPTION,
            StyleRole::BodyText => BODY_TEXT,
            StyleRole::HeaderFooter => HEADER_FOOTER,
            StyleRole::Footnote => FOOTNOTE,
            StyleRole::TocEntry => TOC_ENTRY,
        }
    }
}

/// Blank separator paragraph.
pub fn spacer(before: Option<f32>, after: f32) -> ParagraphStyle {
    ParagraphStyle {
        space_before: before,
        space_after: Some(after),
        alignment: None,
        ..BODY_TEXT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableStyle {
    pub builtin: &'static str,
    pub font: Font,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellStyle {
    pub font: Font,
    pub centered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRole {
    /// Analysis and results tables.
    Body,
    Overview,
}

impl TableRole {
    pub fn table(self) -> TableStyle {
        let font = match self {
            TableRole::Body => font(9.0, BLACK, Some(false), Some(false)),
            TableRole::Overview => font(10.0, BLACK, Some(false), Some(false)),
        };
        TableStyle {
            builtin: TABLE_GRID,
            font,
        }
    }
}

impl TableStyle {
    pub fn cell(&self) -> CellStyle {
        CellStyle {
            font: self.font,
            centered: true,
        }
    }

    pub fn header_cell(&self) -> CellStyle {
        self.cell().bold(true)
    }
}

impl CellStyle {
    pub fn bold(mut self, bold: bool) -> Self {
        self.font.bold = Some(bold);
        self
    }

    pub fn left(mut self) -> Self {
        self.centered = false;
        self
    }
}
