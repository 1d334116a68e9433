//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::config::{Field, FieldMap, QcConfig};
pub use crate::data::visit::{normalize_visit, visit_rollup};
pub use crate::data::{Delimiter, RawTable, SessionRecord, SessionTable};
pub use crate::error::{ListParseError, QcError, QcResult};

pub use crate::heuristics::{Heuristic, HeuristicMask};
pub use crate::pipeline::{Diagnostic, PhaseSummary, SessionFilterPipeline};

pub use crate::dataset::bids::BidsEntities;
pub use crate::dataset::freesurfer::{extract_tree, EulerExtraction};
pub use crate::euler::EulerOutliers;
pub use crate::inclusion::{finalize, InclusionDecision};
pub use crate::motion::MotionBatch;
