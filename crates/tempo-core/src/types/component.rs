//! Model component identifiers.
//!
//! Components partition the model data into independently trackable units.
//! Tasks declare which components they read and write, and the scheduler
//! derives data dependencies from those declarations. The identifiers are
//! opaque equatable tokens; the scheduler never inspects component content.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one component of the model data.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[allow(clippy::upper_case_acronyms)]
pub enum ComponentId {
    /// The RDF data graph under validation.
    DataGraph,
    /// The SHACL shapes graph.
    SHACLShapesGraph,
    /// The most recent validation report.
    ValidationReport,
    /// File and stream input/output state.
    IO,
    /// User interface state.
    UI,
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentId::DataGraph => "DataGraph",
            ComponentId::SHACLShapesGraph => "SHACLShapesGraph",
            ComponentId::ValidationReport => "ValidationReport",
            ComponentId::IO => "IO",
            ComponentId::UI => "UI",
        };
        write!(f, "{}", name)
    }
}
