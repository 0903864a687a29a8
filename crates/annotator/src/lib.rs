//! # The Annotator
//!
//! **Role**: Walks a [`Module`](ir::Module) kind by kind and asks the
//! [`DecisionOracle`] whether to apply each optimistic annotation it finds.
//!
//! **Kind appliers**:
//! - `params`: no-capture, no-alias, dereferenceable, aligned and memory
//!   behavior of pointer parameters.
//! - `function`: internalization, no-unwind, memory effects, return
//!   attributes and the returned parameter.
//! - `overflow`: in-bounds GEPs and no-wrap flags.
//! - `memory`: invariant loads, access alignment, loaded pointer facts.
//! - `branches`: speculation of branch conditions through assumptions.
//! - `loops`: parallel loops.
//!
//! **Traversal**: kinds in registry order; for each kind, functions in
//! processed order; within a function, parameters, the function itself, then
//! its body. Decisions are addressed by position, so this order is part of
//! the control-string format.

pub mod branches;
pub mod embedded;
mod function;
mod loops;
mod memory;
mod overflow;
mod params;
pub mod pass;
pub mod stats;

pub use branches::{SpeculationGroup, SpeculationMap, SpeculationPoint};
pub use pass::{run_pass, PassOptions, PassOutcome};
pub use stats::Statistics;

use common::ChoiceKind;
use ir::NamerError;
use oracle::{DecisionOracle, OracleError, Site};

/// Errors from an annotation pass.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("decision oracle: {0}")]
    Oracle(#[from] OracleError),
    #[error("site naming: {0}")]
    Namer(#[from] NamerError),
    #[error("embedded choices of {function}: {source}")]
    Embedded {
        function: String,
        #[source]
        source: OracleError,
    },
    #[error("control string: {0}")]
    Control(#[source] OracleError),
}

/// Oracle access and counters shared by the appliers during one pass.
pub(crate) struct PassState<'o> {
    oracle: &'o mut DecisionOracle,
    pub(crate) stats: Statistics,
}

impl<'o> PassState<'o> {
    pub(crate) fn new(oracle: &'o mut DecisionOracle) -> Self {
        Self {
            oracle,
            stats: Statistics::new(),
        }
    }

    pub(crate) fn resolve(
        &mut self,
        kind: ChoiceKind,
        site: Site<'_>,
        cardinality: u32,
    ) -> Result<u32, AnnotateError> {
        Ok(self.oracle.resolve(kind, &site, cardinality)?)
    }
}
