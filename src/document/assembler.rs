//! S.4.4 batch-analysis document assembly.
//!
//! The assembler replaces the whole document in a fixed sequence of steps.
//! Each step queues its edits and syncs; a failing step is recorded and the
//! next one still runs. Only the initial clear is fatal.

use std::fmt;
use std::time::Instant;
use thiserror::Error;

use super::host::{DocumentHost, FieldKind, HostError, Story};
use super::params::{
    render_result, results_parameters, shorten_manufacturer, TestParameter, ABBREVIATIONS,
    ANALYSIS_CONTINUED_PARAMETERS, ANALYSIS_PARAMETERS, TBD,
};
use super::style::{spacer, CellStyle, StyleRole, TableRole, TableStyle};
use crate::logging::{log, log_step, obj, v_num, v_str, Domain, Level};
use crate::model::{BatchRecord, Region};

pub const DEFAULT_SPONSOR: &str = "BeiGene";
const FOOTER_SPACER: &str = "                      ";
const FIELD_FALLBACK: &str = "{ PAGE } of { NUMPAGES }";
const SECTION_TITLE: &str = "S.4.4\tBATCH ANALYSES";
const NOTE: &str = "The acceptance criteria shown were those effective at the time of testing, unless otherwise specified. Individual relative retention times (RRTs) shown for single unspecified impurities that are variable across batches are shown as ranges, if applicable. Any single unspecified impurities below the reporting threshold (0.05%) across all batches are not reported.";
const OVERVIEW_HEADERS: [&str; 5] = [
    "Batch Number",
    "Batch Size (kg)",
    "Date of Manufacture",
    "Manufacturer",
    "Use(s)",
];
const NOT_AVAILABLE: &str = "N/A";
const CLINICAL_USE: &str = "Clinical batch";

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("could not clear the document: {0}")]
    ClearFailed(HostError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Clear,
    Header,
    Footer,
    Contents,
    PageBreak,
    Introduction,
    Overview,
    Analysis,
    Results,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Clear => "clear",
            Step::Header => "header",
            Step::Footer => "footer",
            Step::Contents => "contents",
            Step::PageBreak => "page_break",
            Step::Introduction => "introduction",
            Step::Overview => "overview_table",
            Step::Analysis => "analysis_table",
            Step::Results => "results_table",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Ok,
    Failed(String),
    Skipped(String),
}

impl StepOutcome {
    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Ok => "ok",
            StepOutcome::Failed(_) => "failed",
            StepOutcome::Skipped(_) => "skipped",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            StepOutcome::Ok => None,
            StepOutcome::Failed(d) | StepOutcome::Skipped(d) => Some(d.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    pub steps: Vec<StepReport>,
    pub batches: usize,
}

impl AssemblyReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|r| r.outcome == StepOutcome::Ok)
    }

    /// Status line for the task pane.
    pub fn status_message(&self) -> String {
        let failed: Vec<&str> = self.failed().map(|r| r.step.name()).collect();
        if !failed.is_empty() {
            return format!(
                "Document created with errors in: {}. Check the log for details.",
                failed.join(", ")
            );
        }
        if self.is_complete() {
            format!(
                "Complete AIMTA Document created successfully with {} batches!",
                self.batches
            )
        } else {
            "Document created without batch results: no batch analysis data available.".to_string()
        }
    }
}

/// A table ready to be written, one styled text per cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub style: TableStyle,
    pub rows: Vec<Vec<(String, CellStyle)>>,
}

impl TableSpec {
    pub fn cols(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|(t, _)| t.as_str())
    }

    fn write<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<(), HostError> {
        let table = host.append_table(self.rows.len(), self.cols(), &self.style)?;
        for (r, row) in self.rows.iter().enumerate() {
            for (c, (text, style)) in row.iter().enumerate() {
                host.set_cell(table, r, c, text, style)?;
            }
        }
        Ok(())
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        NOT_AVAILABLE
    } else {
        value
    }
}

/// One header row plus one row per batch, five columns.
pub fn overview_table(batches: &[BatchRecord]) -> TableSpec {
    let style = TableRole::Overview.table();
    let header = style.header_cell();
    let cell = style.cell();
    let mut rows = vec![OVERVIEW_HEADERS
        .iter()
        .map(|h| (h.to_string(), header))
        .collect::<Vec<_>>()];
    for batch in batches {
        rows.push(vec![
            (or_na(&batch.batch_number).to_string(), cell),
            (TBD.to_string(), cell),
            (or_na(&batch.manufacture_date).to_string(), cell),
            (shorten_manufacturer(&batch.manufacturer), cell),
            (CLINICAL_USE.to_string(), cell),
        ]);
    }
    TableSpec { style, rows }
}

fn batch_label(batch: &BatchRecord, index: usize) -> String {
    if batch.batch_number.is_empty() {
        format!("Batch {}", index + 1)
    } else {
        batch.batch_number.clone()
    }
}

/// Parameter and criterion columns followed by one result column per batch.
pub fn analysis_table(params: &[TestParameter], batches: &[BatchRecord]) -> TableSpec {
    let style = TableRole::Body.table();
    let header = style.header_cell();
    let cell = style.cell();
    let mut head = vec![
        ("Test Parameter".to_string(), header),
        ("Acceptance Criterion".to_string(), header),
    ];
    head.extend(
        batches
            .iter()
            .enumerate()
            .map(|(i, b)| (batch_label(b, i), header)),
    );
    let mut rows = vec![head];
    for param in params {
        let mut row = vec![
            (param.name.to_string(), cell.bold(param.is_heading())),
            (param.criterion.to_string(), cell),
        ];
        row.extend(
            batches
                .iter()
                .map(|b| (render_result(param, b).to_string(), cell)),
        );
        rows.push(row);
    }
    TableSpec { style, rows }
}

/// Three columns for a single batch; labels and criteria are left aligned.
pub fn results_table(params: &[TestParameter], batch: &BatchRecord) -> TableSpec {
    let style = TableRole::Body.table();
    let header = style.header_cell();
    let cell = style.cell();
    let label = if batch.batch_number.is_empty() {
        "Latest Batch".to_string()
    } else {
        batch.batch_number.clone()
    };
    let mut rows = vec![vec![
        ("Test Parameter".to_string(), header),
        ("Acceptance Criterion".to_string(), header),
        (label, header),
    ]];
    for param in params {
        rows.push(vec![
            (
                param.name.to_string(),
                cell.left().bold(param.is_heading()),
            ),
            (param.criterion.to_string(), cell.left()),
            (render_result(param, batch).to_string(), cell),
        ]);
    }
    TableSpec { style, rows }
}

pub struct DocumentAssembler {
    compound_code: String,
    region: Region,
    batches: Vec<BatchRecord>,
    sponsor: String,
}

impl DocumentAssembler {
    pub fn new(compound_code: impl Into<String>, region: Region, batches: Vec<BatchRecord>) -> Self {
        Self {
            compound_code: compound_code.into(),
            region,
            batches,
            sponsor: DEFAULT_SPONSOR.to_string(),
        }
    }

    pub fn with_sponsor(mut self, sponsor: impl Into<String>) -> Self {
        self.sponsor = sponsor.into();
        self
    }

    pub fn assemble<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
    ) -> Result<AssemblyReport, AssemblyError> {
        let started = Instant::now();
        let mut report = AssemblyReport {
            steps: Vec::new(),
            batches: self.batches.len(),
        };

        let clear_started = Instant::now();
        if let Err(err) = host.clear(Story::Body).and_then(|_| host.sync()) {
            log_step(
                Step::Clear.name(),
                "failed",
                Some(err.to_string().as_str()),
                clear_started.elapsed().as_millis() as u64,
            );
            return Err(AssemblyError::ClearFailed(err));
        }
        self.record(&mut report, Step::Clear, StepOutcome::Ok, clear_started);

        self.run(host, &mut report, Step::Header, Self::header);
        self.run(host, &mut report, Step::Footer, Self::footer);
        self.run(host, &mut report, Step::Contents, Self::contents);
        self.run(host, &mut report, Step::PageBreak, |_, h| {
            h.append_page_break().map(|_| None)
        });
        self.run(host, &mut report, Step::Introduction, Self::introduction);
        self.run(host, &mut report, Step::Overview, Self::overview);
        self.run(host, &mut report, Step::Analysis, Self::analysis);
        self.run(host, &mut report, Step::Results, Self::results);

        log(
            if report.is_complete() {
                Level::Info
            } else {
                Level::Warn
            },
            Domain::Document,
            "assembly_finished",
            obj(&[
                ("compound_code", v_str(&self.compound_code)),
                ("region", v_str(self.region.as_str())),
                ("batches", v_num(self.batches.len() as f64)),
                ("failed_steps", v_num(report.failed().count() as f64)),
                ("elapsed_s", v_num(started.elapsed().as_secs_f64())),
            ]),
        );
        Ok(report)
    }

    /// Run one step and sync. A step returning `Some(reason)` is reported as
    /// skipped. Edits queued before an immediate failure are still flushed so
    /// the next step starts from an empty batch.
    fn run<H, F>(&self, host: &mut H, report: &mut AssemblyReport, step: Step, body: F)
    where
        H: DocumentHost + ?Sized,
        F: FnOnce(&Self, &mut H) -> Result<Option<String>, HostError>,
    {
        let started = Instant::now();
        let outcome = match body(self, host) {
            Ok(skip) => match host.sync() {
                Ok(()) => skip.map_or(StepOutcome::Ok, StepOutcome::Skipped),
                Err(err) => StepOutcome::Failed(err.to_string()),
            },
            Err(err) => match host.sync() {
                Ok(()) => StepOutcome::Failed(err.to_string()),
                Err(flush) => StepOutcome::Failed(format!("{}; flush: {}", err, flush)),
            },
        };
        self.record(report, step, outcome, started);
    }

    fn record(&self, report: &mut AssemblyReport, step: Step, outcome: StepOutcome, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        log_step(step.name(), outcome.label(), outcome.detail(), elapsed_ms);
        report.steps.push(StepReport {
            step,
            outcome,
            elapsed_ms,
        });
    }

    fn header<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        let style = StyleRole::HeaderFooter.paragraph();
        host.clear(Story::Header)?;
        let first = host.append_paragraph(Story::Header, &self.compound_code, &style)?;
        host.append_text(first, "\t\t")?;
        host.append_text(first, &self.sponsor)?;
        host.append_paragraph(
            Story::Header,
            &format!("S.4.4 Batch Analyses [{}, All]", self.compound_code),
            &style.with_space_after(6.0),
        )?;
        Ok(None)
    }

    fn footer<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        host.clear(Story::Footer)?;
        let para = host.append_paragraph(
            Story::Footer,
            "CONFIDENTIAL",
            &StyleRole::HeaderFooter.paragraph(),
        )?;
        host.append_text(para, FOOTER_SPACER)?;
        host.append_text(para, "Page ")?;
        let fields = host
            .append_field(para, FieldKind::Page)
            .and_then(|_| host.append_text(para, " of "))
            .and_then(|_| host.append_field(para, FieldKind::NumPages));
        if let Err(err) = fields {
            log(
                Level::Warn,
                Domain::Document,
                "page_fields_unavailable",
                obj(&[("msg", v_str(&err.to_string()))]),
            );
            host.append_text(para, FIELD_FALLBACK)?;
        }
        Ok(None)
    }

    fn table_titles(&self) -> [String; 3] {
        let code = &self.compound_code;
        [
            format!("Overview of {} Drug Substance Batches", code),
            format!("Batch Analysis for GMP Batches of {} Drug Substance", code),
            format!("Batch Results for GMP Batches of {} Drug Substance", code),
        ]
    }

    fn contents<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        let title = StyleRole::MainTitle.paragraph();
        let entry = StyleRole::TocEntry.paragraph();
        host.append_paragraph(Story::Body, "TABLE OF CONTENTS", &title)?;
        for line in [
            "TABLE OF CONTENTS\t1",
            "LIST OF TABLES\t1",
            "S.4.4\tBATCH ANALYSES\t2",
        ] {
            host.append_paragraph(Story::Body, line, &entry)?;
        }
        host.append_paragraph(Story::Body, "", &StyleRole::BodyText.paragraph())?;
        host.append_paragraph(Story::Body, "LIST OF TABLES", &title.with_space_before(12.0))?;
        for (i, (name, page)) in self.table_titles().iter().zip([2, 3, 5]).enumerate() {
            host.append_paragraph(
                Story::Body,
                &format!("Table {}:\t{}\t{}", i + 1, name, page),
                &entry,
            )?;
        }
        Ok(None)
    }

    fn introduction<H: DocumentHost + ?Sized>(
        &self,
        host: &mut H,
    ) -> Result<Option<String>, HostError> {
        let body = StyleRole::BodyText.paragraph();
        host.append_paragraph(Story::Body, SECTION_TITLE, &StyleRole::SectionTitle.paragraph())?;
        host.append_paragraph(
            Story::Body,
            &format!(
                "A summary of {} drug substance batches manufactured is provided in Table 1. \
                 The corresponding batch analysis results for clinical batches are provided in \
                 Table 2 and Table 3, respectively.",
                self.compound_code
            ),
            &body,
        )?;
        host.append_paragraph(Story::Body, NOTE, &body.with_space_after(12.0))?;
        Ok(None)
    }

    fn caption<H: DocumentHost + ?Sized>(&self, host: &mut H, text: &str) -> Result<(), HostError> {
        host.append_paragraph(Story::Body, text, &StyleRole::TableCaption.paragraph())
            .map(|_| ())
    }

    fn footnote<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<(), HostError> {
        host.append_paragraph(Story::Body, ABBREVIATIONS, &StyleRole::Footnote.paragraph())
            .map(|_| ())
    }

    fn overview<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        let [title, _, _] = self.table_titles();
        self.caption(host, &format!("Table 1:\t{}", title))?;
        overview_table(&self.batches).write(host)?;
        host.append_paragraph(Story::Body, "", &spacer(Some(6.0), 12.0))?;
        Ok(None)
    }

    fn analysis<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        let [_, title, _] = self.table_titles();
        self.caption(host, &format!("Table 2: {}", title))?;
        analysis_table(ANALYSIS_PARAMETERS, &self.batches).write(host)?;
        host.append_paragraph(Story::Body, "", &spacer(None, 12.0))?;
        self.caption(host, &format!("Table 2: {} (Continued)", title))?;
        analysis_table(ANALYSIS_CONTINUED_PARAMETERS, &self.batches).write(host)?;
        self.footnote(host)?;
        host.append_paragraph(Story::Body, "", &spacer(None, 12.0))?;
        Ok(None)
    }

    fn results<H: DocumentHost + ?Sized>(&self, host: &mut H) -> Result<Option<String>, HostError> {
        let [_, _, title] = self.table_titles();
        self.caption(host, &format!("Table 3: {}", title))?;
        let Some(latest) = self.batches.last() else {
            return Ok(Some("no batch data".to_string()));
        };
        results_table(results_parameters(self.region), latest).write(host)?;
        self.footnote(host)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::memory::MemoryDocument;

    fn batch(number: &str, results: &[(&str, &str)]) -> BatchRecord {
        BatchRecord {
            batch_number: number.to_string(),
            manufacturer: "Changzhou SynTheAll Pharmaceutical".to_string(),
            test_results: results
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_overview_shape() {
        let batches = vec![batch("B1", &[]), batch("", &[])];
        let t = overview_table(&batches);
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.cols(), 5);
        assert_eq!(t.text(0, 4), Some("Use(s)"));
        assert_eq!(t.text(1, 0), Some("B1"));
        assert_eq!(t.text(2, 0), Some("N/A"));
        assert_eq!(t.text(1, 1), Some("TBD"));
        assert_eq!(t.text(1, 2), Some("N/A"));
        assert_eq!(t.text(1, 3), Some("Changzhou STA"));
        assert_eq!(t.text(2, 4), Some("Clinical batch"));
    }

    #[test]
    fn test_analysis_headers_and_bold() {
        let batches = vec![batch("", &[]), batch("B2", &[])];
        let t = analysis_table(ANALYSIS_PARAMETERS, &batches);
        assert_eq!(t.cols(), 4);
        assert_eq!(t.text(0, 2), Some("Batch 1"));
        assert_eq!(t.text(0, 3), Some("B2"));
        assert_eq!(t.rows[1][0].1.font.bold, Some(true));
        assert_eq!(t.rows[3][0].1.font.bold, Some(false));
        assert!(t.rows.iter().all(|r| r[0].1.centered));
    }

    #[test]
    fn test_results_alignment() {
        let t = results_table(RESULTS, &batch("", &[("IR", "Conforms")]));
        assert_eq!(t.text(0, 2), Some("Latest Batch"));
        assert!(!t.rows[1][0].1.centered);
        assert!(!t.rows[1][1].1.centered);
        assert!(t.rows[1][2].1.centered);
        assert_eq!(t.text(3, 2), Some("Conforms"));
    }

    const RESULTS: &[TestParameter] = crate::document::params::RESULTS_PARAMETERS;

    #[test]
    fn test_assembles_all_steps() {
        let mut doc = MemoryDocument::new();
        let report = DocumentAssembler::new("BGB-16673", Region::Us, vec![batch("B1", &[])])
            .assemble(&mut doc)
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.steps.len(), 9);
        assert_eq!(doc.tables().count(), 4);
        assert!(report.status_message().contains("successfully"));
    }

    #[test]
    fn test_no_batches_skips_results() {
        let mut doc = MemoryDocument::new();
        let report = DocumentAssembler::new("BGB-16673", Region::Cn, Vec::new())
            .assemble(&mut doc)
            .unwrap();
        assert!(matches!(
            report.outcome(Step::Results),
            Some(StepOutcome::Skipped(_))
        ));
        assert_eq!(report.failed().count(), 0);
        // overview header plus the two analysis blocks
        assert_eq!(doc.tables().count(), 3);
        assert!(report.status_message().contains("without batch results"));
    }

    #[test]
    fn test_failed_flush_is_kept_in_step_detail() {
        use crate::document::memory::{EditKind, FaultPlan};

        let mut doc = MemoryDocument::with_faults(
            FaultPlan::none().fail(EditKind::Paragraph, Some(Story::Header)),
        );
        let assembler = DocumentAssembler::new("BGB-16673", Region::Us, Vec::new());
        let mut report = AssemblyReport::default();
        assembler.run(&mut doc, &mut report, Step::Header, |_, h| {
            h.append_paragraph(Story::Header, "BGB-16673", &StyleRole::HeaderFooter.paragraph())?;
            Err(HostError::Unsupported("tab stops"))
        });

        match report.outcome(Step::Header) {
            Some(StepOutcome::Failed(detail)) => {
                assert!(detail.starts_with("tab stops is not supported"), "{}", detail);
                assert!(detail.contains("flush: sync failed"), "{}", detail);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(doc.pending_edits(), 0);
    }
}
