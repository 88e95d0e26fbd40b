//! End-to-end document assembly against the in-memory host.

use std::collections::HashMap;

use aimta::document::memory::{Block, Paragraph, Table};
use aimta::document::{
    AssemblyError, DocumentAssembler, EditKind, FaultPlan, MemoryDocument, Step, StepOutcome,
    Story,
};
use aimta::model::{BatchRecord, Region};

fn batch(number: &str, manufacturer: &str, results: &[(&str, &str)]) -> BatchRecord {
    BatchRecord {
        filename: format!("{}.pdf", number),
        batch_number: number.to_string(),
        manufacture_date: "2024-01-15".to_string(),
        manufacturer: manufacturer.to_string(),
        test_results: results
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

fn two_batches() -> Vec<BatchRecord> {
    vec![
        batch(
            "B2401",
            "Changzhou SynTheAll Pharmaceutical Co., Ltd.",
            &[("HPLC", "Conforms"), ("RRT 0.56", "0.08")],
        ),
        batch("B2402", "Asymchem", &[]),
    ]
}

fn tables(doc: &MemoryDocument) -> Vec<&Table> {
    doc.tables().collect()
}

fn row<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    (0..table.rows())
        .map(|r| table.row_text(r))
        .find(|cells| cells.first() == Some(&name))
        .unwrap_or_else(|| panic!("no row {}", name))
}

fn body_texts(doc: &MemoryDocument) -> Vec<String> {
    doc.paragraphs(Story::Body).map(Paragraph::text).collect()
}

#[test]
fn test_scenario_hplc_conforms_then_tbd() {
    let mut doc = MemoryDocument::new();
    let report = DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .assemble(&mut doc)
        .unwrap();
    assert!(report.is_complete(), "{:?}", report.steps);

    let analysis = tables(&doc)[1];
    assert_eq!(
        analysis.row_text(0),
        vec!["Test Parameter", "Acceptance Criterion", "B2401", "B2402"]
    );
    assert_eq!(
        row(analysis, "HPLC"),
        vec!["HPLC", "Conforms to reference standard", "Conforms", "TBD"]
    );
    // grouping rows and criterion-less impurities stay blank
    assert_eq!(row(analysis, "Identification")[2..], ["", ""]);
    assert_eq!(row(analysis, "RRT 0.56")[2..], ["0.08", ""]);
    assert_eq!(row(analysis, "BGB-24860")[2..], ["", ""]);
}

#[test]
fn test_overview_has_row_per_batch() {
    let mut doc = MemoryDocument::new();
    DocumentAssembler::new("BGB-16673", Region::Cn, two_batches())
        .assemble(&mut doc)
        .unwrap();

    let overview = tables(&doc)[0];
    assert_eq!((overview.rows(), overview.cols()), (3, 5));
    assert_eq!(
        overview.row_text(1),
        vec!["B2401", "TBD", "2024-01-15", "Changzhou STA", "Clinical batch"]
    );
    assert_eq!(overview.row_text(2)[3], "Asymchem");
    assert_eq!(overview.style.font.size, 10.0);
}

#[test]
fn test_results_table_uses_last_batch() {
    let mut doc = MemoryDocument::new();
    let mut batches = two_batches();
    batches[1]
        .test_results
        .insert("Water Content -- KF (%w/w)".to_string(), "0.4".to_string());
    DocumentAssembler::new("BGB-16673", Region::Eu, batches)
        .assemble(&mut doc)
        .unwrap();

    let all = tables(&doc);
    assert_eq!(all.len(), 4);
    let results = all[3];
    assert_eq!(results.cols(), 3);
    assert_eq!(results.row_text(0)[2], "B2402");
    assert_eq!(
        row(results, "Water Content -- KF (% w/w)"),
        vec!["Water Content -- KF (% w/w)", "≤ 3.5", "0.4"]
    );
    assert_eq!(row(results, "HPLC")[2], "TBD");
    let heading = results.cell(1, 0).unwrap();
    assert_eq!(heading.style.unwrap().font.bold, Some(true));
    assert!(!heading.style.unwrap().centered);
}

#[test]
fn test_front_matter_and_headers() {
    let mut doc = MemoryDocument::new();
    DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .with_sponsor("BeOne")
        .assemble(&mut doc)
        .unwrap();

    let header: Vec<String> = doc.paragraphs(Story::Header).map(Paragraph::text).collect();
    assert_eq!(
        header,
        vec![
            "BGB-16673\t\tBeOne".to_string(),
            "S.4.4 Batch Analyses [BGB-16673, All]".to_string()
        ]
    );

    let footer = doc.paragraphs(Story::Footer).next().unwrap();
    assert!(footer.text().starts_with("CONFIDENTIAL"));
    assert!(footer.text().ends_with("Page { PAGE } of { NUMPAGES }"));

    let body = body_texts(&doc);
    assert_eq!(body[0], "TABLE OF CONTENTS");
    assert!(body.contains(&"S.4.4\tBATCH ANALYSES\t2".to_string()));
    assert!(body.contains(&"Table 3:\tBatch Results for GMP Batches of BGB-16673 Drug Substance\t5".to_string()));
    assert!(body
        .iter()
        .any(|p| p.starts_with("A summary of BGB-16673 drug substance batches")));
    assert!(body
        .iter()
        .any(|p| p == "Table 2: Batch Analysis for GMP Batches of BGB-16673 Drug Substance (Continued)"));

    let break_at = doc
        .story(Story::Body)
        .iter()
        .position(|b| matches!(b, Block::PageBreak))
        .unwrap();
    let first_table = doc
        .story(Story::Body)
        .iter()
        .position(|b| matches!(b, Block::Table(_)))
        .unwrap();
    assert!(break_at < first_table);
}

#[test]
fn test_footer_falls_back_without_fields() {
    let mut doc = MemoryDocument::with_faults(FaultPlan::none().without_fields());
    let report = DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .assemble(&mut doc)
        .unwrap();

    assert_eq!(report.outcome(Step::Footer), Some(&StepOutcome::Ok));
    let footer = doc.paragraphs(Story::Footer).next().unwrap();
    assert_eq!(
        footer.text(),
        "CONFIDENTIAL                      Page { PAGE } of { NUMPAGES }"
    );
    assert!(footer
        .runs
        .iter()
        .all(|r| matches!(r, aimta::document::memory::Run::Text { .. })));
}

#[test]
fn test_failed_header_does_not_stop_tables() {
    let mut doc = MemoryDocument::with_faults(
        FaultPlan::none().fail(EditKind::Paragraph, Some(Story::Header)),
    );
    let report = DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .assemble(&mut doc)
        .unwrap();

    assert!(matches!(
        report.outcome(Step::Header),
        Some(StepOutcome::Failed(_))
    ));
    assert_eq!(report.failed().count(), 1);
    assert_eq!(tables(&doc).len(), 4);
    assert!(report.status_message().contains("header"));
}

#[test]
fn test_failed_clear_aborts() {
    let mut doc =
        MemoryDocument::with_faults(FaultPlan::none().fail(EditKind::Clear, Some(Story::Body)));
    let err = DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .assemble(&mut doc)
        .unwrap_err();

    assert!(matches!(err, AssemblyError::ClearFailed(_)));
    assert!(doc.story(Story::Body).is_empty());
    assert!(doc.story(Story::Header).is_empty());
}

#[test]
fn test_document_json_written_to_file() {
    let mut doc = MemoryDocument::new();
    DocumentAssembler::new("BGB-16673", Region::Us, two_batches())
        .assemble(&mut doc)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.json");
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let body = value["body"].as_array().unwrap();
    let table = body.iter().find(|b| b["block"] == "table").unwrap();
    assert_eq!(table["style"]["builtin"], "Table Grid");
    assert_eq!(table["cells"][0][0]["text"], "Batch Number");
    assert_eq!(value["footer"][0]["style"]["font"]["name"], "Times New Roman");
}
