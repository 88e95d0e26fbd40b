//! Word-style document assembly against an abstract host.

pub mod assembler;
pub mod host;
pub mod memory;
pub mod params;
pub mod style;

pub use assembler::{AssemblyError, AssemblyReport, DocumentAssembler, Step, StepOutcome};
pub use host::{DocumentHost, FieldKind, HostError, ParagraphRef, Story, TableRef};
pub use memory::{EditKind, FaultPlan, MemoryDocument};
