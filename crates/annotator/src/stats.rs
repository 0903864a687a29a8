//! Named counters of applied annotations.

use std::collections::BTreeMap;
use std::fmt;

pub const NUM_ALIGNED_MEMORY_INST: &str = "NumAlignedMemoryInst";
pub const NUM_DEREFERENCEABLE_MEMORY_INST: &str = "NumDereferenceableMemoryInst";
pub const NUM_INVARIANT_LOADS: &str = "NumInvariantLoads";
pub const NUM_NO_SIGNED_WRAP_OPS: &str = "NumNoSignedWrapOps";
pub const NUM_NO_UNSIGNED_WRAP_OPS: &str = "NumNoUnsignedWrapOps";
pub const NUM_INBOUND_GEPS: &str = "NumInboundGEPs";
pub const NUM_NO_ALIAS_PARAMETERS: &str = "NumNoAliasParameters";
pub const NUM_ALIGNED_PARAMETERS: &str = "NumAlignedParameters";
pub const NUM_READ_NONE_PARAMETERS: &str = "NumReadNoneParameters";
pub const NUM_READ_ONLY_PARAMETERS: &str = "NumReadOnlyParameters";
pub const NUM_WRITE_ONLY_PARAMETERS: &str = "NumWriteOnlyParameters";
pub const NUM_NO_CAPTURE_PARAMETERS: &str = "NumNoCaptureParameters";
pub const NUM_DEREFERENCEABLE_PARAMETERS: &str = "NumDereferenceableParameters";
pub const NUM_RETURNED_PARAMETERS: &str = "NumReturnedParameters";
pub const NUM_READ_NONE_FUNCTIONS: &str = "NumReadNoneFunctions";
pub const NUM_READ_ONLY_FUNCTIONS: &str = "NumReadOnlyFunctions";
pub const NUM_WRITE_ONLY_FUNCTIONS: &str = "NumWriteOnlyFunctions";
pub const NUM_FUNCTIONS_INTERNALIZED: &str = "NumFunctionsInternalized";
pub const NUM_FUNCTIONS_NO_UNWIND: &str = "NumFunctionsNoUnwind";
pub const NUM_FUNCTIONS_ARG_MEM_ONLY: &str = "NumFunctionsArgMemOnly";
pub const NUM_FUNCTIONS_INACCESSIBLE_ONLY: &str = "NumFunctionsInaccessibleOnly";
pub const NUM_FUNCTIONS_ARG_MEM_OR_INACCESSIBLE_ONLY: &str = "NumFunctionsArgMemOrInaccessibleOnly";
pub const NUM_FUNCTIONS_SPECULATABLE: &str = "NumFunctionsSpeculatable";
pub const NUM_FUNCTIONS_NO_ALIAS_RETURN: &str = "NumFunctionsNoAliasReturn";
pub const NUM_FUNCTIONS_DEREFERENCEABLE_RETURN: &str = "NumFunctionsDereferenceableReturn";
pub const NUM_CONDITIONAL_BRANCHES_ELIMINATED: &str = "NumConditionalBranchesEliminated";
pub const NUM_PARALLEL_INNERMOST_LOOPS: &str = "NumParallelInnermostLoops";
pub const NUM_PARALLEL_OUTER_LOOPS: &str = "NumParallelOuterLoops";

/// Counters of one pass, keyed by counter name. Only nonzero counters are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    counters: BTreeMap<&'static str, u64>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Sum of all counters.
    pub fn total(&self) -> u64 {
        self.counters.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Adds `other`'s counts into `self`.
    pub fn merge(&mut self, other: &Statistics) {
        for (&name, &count) in &other.counters {
            *self.counters.entry(name).or_insert(0) += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(&name, &count)| (name, count))
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in self.iter() {
            writeln!(f, "{count:>8} {name}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_merge() {
        let mut a = Statistics::new();
        a.bump(NUM_INBOUND_GEPS);
        a.bump(NUM_INBOUND_GEPS);
        let mut b = Statistics::new();
        b.bump(NUM_INVARIANT_LOADS);
        b.bump(NUM_INBOUND_GEPS);
        a.merge(&b);
        assert_eq!(a.get(NUM_INBOUND_GEPS), 3);
        assert_eq!(a.get(NUM_INVARIANT_LOADS), 1);
        assert_eq!(a.get(NUM_PARALLEL_OUTER_LOOPS), 0);
        assert_eq!(a.total(), 4);
        assert_eq!(a.to_string(), "       3 NumInboundGEPs\n       1 NumInvariantLoads\n");
    }
}
