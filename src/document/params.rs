//! Fixed test-parameter lists of the batch-analysis tables and the rules for
//! rendering a batch's result against one of them.

use crate::model::{BatchRecord, Region};

/// One row of a batch-analysis table.
///
/// An empty `key` marks a grouping row. An empty `criterion` on a keyed row
/// marks an item that is reported only when the batch has a value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestParameter {
    pub name: &'static str,
    pub criterion: &'static str,
    pub key: &'static str,
}

impl TestParameter {
    pub const fn new(name: &'static str, criterion: &'static str) -> Self {
        Self {
            name,
            criterion,
            key: name,
        }
    }

    pub const fn keyed(name: &'static str, criterion: &'static str, key: &'static str) -> Self {
        Self {
            name,
            criterion,
            key,
        }
    }

    pub const fn group(name: &'static str) -> Self {
        Self {
            name,
            criterion: "",
            key: "",
        }
    }

    /// Names like `Assay -- HPLC` head a test method and render bold.
    pub fn is_heading(&self) -> bool {
        self.name.contains("--")
    }
}

pub const TBD: &str = "TBD";

pub const CONFORMS: &str = "Conforms to reference standard";

pub const ANALYSIS_PARAMETERS: &[TestParameter] = &[
    TestParameter::new("Appearance -- visual inspection", "Light yellow to yellow powder"),
    TestParameter::group("Identification"),
    TestParameter::new("IR", CONFORMS),
    TestParameter::new("HPLC", CONFORMS),
    TestParameter::new("Assay -- HPLC (on anhydrous basis, %w/w)", "97.0-103.0"),
    TestParameter::group("Organic Impurities -- HPLC (%w/w)"),
    TestParameter::new("Single unspecified impurity", "≤ 0.50"),
    TestParameter::new("BGB-24860", ""),
    TestParameter::new("RRT 0.56", ""),
    TestParameter::new("RRT 0.70", ""),
    TestParameter::new("RRT 0.72-0.73", ""),
    TestParameter::new("RRT 0.76", ""),
    TestParameter::new("RRT 0.80", ""),
    TestParameter::new("RRT 1.10", ""),
    TestParameter::new("Total impurities", "≤ 2.0"),
    TestParameter::new("Enantiomeric Impurity -- HPLC (%w/w)", "≤ 1.0"),
    TestParameter::group("Residual Solvents -- GC (ppm)"),
    TestParameter::new("Dichloromethane", "≤ 600"),
    TestParameter::new("Ethyl acetate", "≤ 5000"),
    TestParameter::new("Isopropanol", "≤ 5000"),
    TestParameter::new("Methanol", "≤ 3000"),
    TestParameter::new("Tetrahydrofuran", "≤ 720"),
];

pub const ANALYSIS_CONTINUED_PARAMETERS: &[TestParameter] = &[
    TestParameter::new("Residue on Ignition (%w/w)", "≤ 0.2"),
    TestParameter::group("Elemental Impurities -- ICP-MS"),
    TestParameter::new("Palladium (ppm)", "≤ 25"),
    TestParameter::new("Polymorphic Form -- XRPD", CONFORMS),
    TestParameter::new("Water Content -- KF (%w/w)", "Report result"),
];

/// Results-table rows. Display names differ from the analysis keys in a few
/// places; the keys stay aligned with what the extraction backend emits.
pub const RESULTS_PARAMETERS: &[TestParameter] = &[
    TestParameter::new("Appearance -- visual inspection", "Light yellow to yellow powder"),
    TestParameter::group("Identification"),
    TestParameter::new("IR", CONFORMS),
    TestParameter::new("HPLC", CONFORMS),
    TestParameter::keyed(
        "Assay -- HPLC (on anhydrous basis, % w/w)",
        "97.0-103.0",
        "Assay -- HPLC (on anhydrous basis, %w/w)",
    ),
    TestParameter::group("Organic Impurities -- HPLC (% w/w)"),
    TestParameter::new("Single unspecified impurity", "≤ 0.30"),
    TestParameter::new("RRT 0.83", ""),
    TestParameter::new("Total impurities", "≤ 2.0"),
    TestParameter::keyed(
        "Enantiomeric Impurity -- HPLC (% w/w)",
        "≤ 0.5",
        "Enantiomeric Impurity -- HPLC (%w/w)",
    ),
    TestParameter::group("Residual Solvents -- GC (ppm)"),
    TestParameter::new("Dichloromethane", "≤ 600"),
    TestParameter::new("Ethyl acetate", "≤ 5000"),
    TestParameter::new("Isopropanol", "≤ 5000"),
    TestParameter::new("Methanol", "≤ 3000"),
    TestParameter::new("Tetrahydrofuran", "≤ 720"),
    TestParameter::group("Inorganic Impurities"),
    TestParameter::keyed(
        "Residue on ignition (% w/w)",
        "≤ 0.2",
        "Residue on Ignition (%w/w)",
    ),
    TestParameter::keyed(
        "Elemental impurities -- ICP-MS (Pd) (ppm)",
        "≤ 25",
        "Palladium (ppm)",
    ),
    TestParameter::new("Polymorphic Form -- XRPD", CONFORMS),
    TestParameter::keyed(
        "Water Content -- KF (% w/w)",
        "≤ 3.5",
        "Water Content -- KF (%w/w)",
    ),
];

pub const ABBREVIATIONS: &str = "Abbreviations: GC = gas chromatography; HPLC = high-performance liquid chromatography; ICP-MS = inductively coupled plasma mass spectrometry; IR = infrared spectroscopy; KF = Karl Fischer; ND = not detected; Pd = Palladium; RRT = relative retention time; XRPD = X\u{2011}ray powder diffraction.";

/// Results-table parameter list for a region. Every region currently shares
/// one list.
pub fn results_parameters(region: Region) -> &'static [TestParameter] {
    match region {
        Region::Cn | Region::Eu | Region::Us => RESULTS_PARAMETERS,
    }
}

/// Cell text for `param` in `batch`'s column.
///
/// A keyed parameter shows the batch's value when it has a non-empty one.
/// Otherwise grouping rows and criterion-less items stay blank and
/// everything else reads `TBD`.
pub fn render_result<'a>(param: &TestParameter, batch: &'a BatchRecord) -> &'a str {
    if !param.key.is_empty() {
        if let Some(value) = batch.result(param.key) {
            return value;
        }
    }
    if param.key.is_empty() || param.criterion.is_empty() {
        ""
    } else {
        TBD
    }
}

const SYNTHEALL: &str = "Changzhou SynTheAll";

pub fn shorten_manufacturer(name: &str) -> String {
    if name.contains(SYNTHEALL) {
        "Changzhou STA".to_string()
    } else {
        name.to_string()
    }
}
