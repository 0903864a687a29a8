//! # Choice-Kind Registry
//!
//! The closed, ordered catalogue of optimistic annotation categories.
//!
//! Every kind has:
//! - an **ordinal** (1..=22) fixing its position in a full annotation pass,
//! - a **code** character (`'0' + ordinal`) used by the control-string grammar,
//! - a **cardinality** of choices per site, fixed for most kinds and derived
//!   from the site for the rest (see [`SiteShape`]).
//!
//! Choice `0` always means "no annotation"; the highest choice is the most
//! aggressive annotation the kind knows about.

use std::fmt;

/// Widest per-site cardinality of any kind (function memory effects).
pub const MAX_CARDINALITY: u32 = 14;

/// Annotation categories in their fixed traversal and encoding order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(u8)]
pub enum ChoiceKind {
    ParameterNoAlias = 1,
    FunctionReturnNoAlias = 2,
    ParameterNoCapture = 3,
    OverflowNoSignedWrap = 4,
    OverflowNoUnsignedWrap = 5,
    InboundsGep = 6,
    FunctionNoUnwind = 7,
    LoopParallelInnermost = 8,
    LoopParallelOuter = 9,
    FunctionInternal = 10,
    FunctionReturnDereferenceable = 11,
    ParameterDereferenceable = 12,
    MemoryAccessDereferenceable = 13,
    ParameterAligned = 14,
    MemoryAccessAlign = 15,
    MemoryAccessResultAlign = 16,
    ControlFlowTarget = 17,
    MemoryLoadInvariant = 18,
    ParameterReturned = 19,
    ParameterMemBehavior = 20,
    FunctionMemEffects = 21,
    /// Registered so its code stays reserved; no applier visits it.
    LoopBackedgeTaken = 22,
}

/// Errors from registry lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KindError {
    #[error("unknown choice-kind code {code:?}")]
    UnknownCode { code: char },
    #[error("unknown choice-kind ordinal {0}")]
    UnknownOrdinal(u8),
}

/// What a site contributes to its own cardinality.
///
/// Most kinds ignore this and use [`ChoiceKind::fixed_cardinality`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteShape {
    Plain,
    /// The `llvm.assume` intrinsic only admits the write-only half of the
    /// memory-effect table.
    AssumeIntrinsic,
    /// Parameters whose type equals the return type.
    ReturnCandidates(u32),
    /// Distinct constants a speculated value was compared against.
    SpeculatedConstants(u32),
}

impl ChoiceKind {
    pub const ALL: [ChoiceKind; 22] = [
        ChoiceKind::ParameterNoAlias,
        ChoiceKind::FunctionReturnNoAlias,
        ChoiceKind::ParameterNoCapture,
        ChoiceKind::OverflowNoSignedWrap,
        ChoiceKind::OverflowNoUnsignedWrap,
        ChoiceKind::InboundsGep,
        ChoiceKind::FunctionNoUnwind,
        ChoiceKind::LoopParallelInnermost,
        ChoiceKind::LoopParallelOuter,
        ChoiceKind::FunctionInternal,
        ChoiceKind::FunctionReturnDereferenceable,
        ChoiceKind::ParameterDereferenceable,
        ChoiceKind::MemoryAccessDereferenceable,
        ChoiceKind::ParameterAligned,
        ChoiceKind::MemoryAccessAlign,
        ChoiceKind::MemoryAccessResultAlign,
        ChoiceKind::ControlFlowTarget,
        ChoiceKind::MemoryLoadInvariant,
        ChoiceKind::ParameterReturned,
        ChoiceKind::ParameterMemBehavior,
        ChoiceKind::FunctionMemEffects,
        ChoiceKind::LoopBackedgeTaken,
    ];

    /// The kind a full annotation pass starts with.
    pub fn first() -> ChoiceKind {
        Self::ALL[0]
    }

    /// Successor in pass order, `None` after the last kind.
    pub fn next(self) -> Option<ChoiceKind> {
        Self::ALL.get(self.ordinal() as usize).copied()
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Result<ChoiceKind, KindError> {
        match ordinal {
            1..=22 => Ok(Self::ALL[ordinal as usize - 1]),
            _ => Err(KindError::UnknownOrdinal(ordinal)),
        }
    }

    /// Single-character code used after the `#c` escape.
    ///
    /// # Examples
    /// ```
    /// # use common::ChoiceKind;
    /// assert_eq!(ChoiceKind::InboundsGep.code(), '6');
    /// assert_eq!(ChoiceKind::ParameterDereferenceable.code(), '<');
    /// ```
    pub fn code(self) -> char {
        char::from(b'0' + self.ordinal())
    }

    pub fn from_code(code: char) -> Result<ChoiceKind, KindError> {
        let ordinal = (code as u32)
            .checked_sub('0' as u32)
            .and_then(|o| u8::try_from(o).ok())
            .ok_or(KindError::UnknownCode { code })?;
        Self::from_ordinal(ordinal).map_err(|_| KindError::UnknownCode { code })
    }

    /// Cardinality shared by every site of this kind, if there is one.
    pub fn fixed_cardinality(self) -> Option<u32> {
        use ChoiceKind::*;
        match self {
            ParameterNoAlias
            | FunctionReturnNoAlias
            | ParameterNoCapture
            | OverflowNoSignedWrap
            | OverflowNoUnsignedWrap
            | InboundsGep
            | FunctionNoUnwind
            | LoopParallelInnermost
            | LoopParallelOuter
            | FunctionInternal
            | MemoryLoadInvariant
            | LoopBackedgeTaken => Some(2),
            FunctionReturnDereferenceable
            | ParameterDereferenceable
            | MemoryAccessDereferenceable
            | ParameterAligned
            | MemoryAccessAlign
            | MemoryAccessResultAlign => Some(3),
            ParameterMemBehavior => Some(4),
            FunctionMemEffects => Some(MAX_CARDINALITY),
            ControlFlowTarget | ParameterReturned => None,
        }
    }

    /// Number of choices at a site of the given shape.
    ///
    /// Returns `0` when a site-dependent kind is asked about a [`SiteShape::Plain`]
    /// site; the oracle rejects zero cardinalities.
    pub fn cardinality(self, shape: SiteShape) -> u32 {
        match (self, shape) {
            (ChoiceKind::ControlFlowTarget, SiteShape::SpeculatedConstants(n)) => n + 1,
            (ChoiceKind::ParameterReturned, SiteShape::ReturnCandidates(n)) => n + 1,
            (ChoiceKind::FunctionMemEffects, SiteShape::AssumeIntrinsic) => 8,
            (kind, _) => kind.fixed_cardinality().unwrap_or(0),
        }
    }

    /// Fixed-width `[category][name]` label used in choice trace lines.
    pub fn label(self) -> &'static str {
        use ChoiceKind::*;
        match self {
            OverflowNoSignedWrap => "[Op ][NoSgnWrap]",
            OverflowNoUnsignedWrap => "[Op ][NoUnsWrap]",
            InboundsGep => "[GEP][Inbounds ]",
            ParameterNoAlias => "[Par][NoAlias  ]",
            ParameterAligned => "[Par][Alignment]",
            ParameterNoCapture => "[Par][NoCapture]",
            ParameterDereferenceable => "[Par][Dereferen]",
            ParameterMemBehavior => "[Par][MemAccess]",
            FunctionReturnNoAlias => "[Fn][RetNoAlia ]",
            FunctionReturnDereferenceable => "[Fn][RetDerefe ]",
            FunctionInternal => "[Fn][Internaliz]",
            FunctionNoUnwind => "[Fn][NoUnwind  ]",
            FunctionMemEffects => "[Fn][MemEffects]",
            ParameterReturned => "[Fn][Returned  ]",
            ControlFlowTarget => "[CFG][BranchTrg]",
            MemoryAccessAlign => "[Mem][Alignment]",
            MemoryAccessResultAlign => "[Mem][ResAlign ]",
            MemoryAccessDereferenceable => "[Mem][Dereferen]",
            MemoryLoadInvariant => "[Ld ][Invariant]",
            LoopParallelInnermost => "[Lop][ParallelI]",
            LoopParallelOuter => "[Lop][ParallelO]",
            LoopBackedgeTaken => "[Lop][BackEdgeT]",
        }
    }

    /// Inverse of [`ChoiceKind::label`].
    pub fn from_label(label: &str) -> Option<ChoiceKind> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }
}

impl fmt::Display for ChoiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_walks_every_kind_once() {
        let mut seen = vec![ChoiceKind::first()];
        let mut kind = ChoiceKind::first();
        while let Some(next) = kind.next() {
            assert!(next > kind);
            seen.push(next);
            kind = next;
        }
        assert_eq!(seen, ChoiceKind::ALL.to_vec());
    }

    #[test]
    fn test_codes_roundtrip() {
        for kind in ChoiceKind::ALL {
            assert_eq!(ChoiceKind::from_code(kind.code()), Ok(kind));
        }
        assert_eq!(ChoiceKind::from_code('<'), Ok(ChoiceKind::ParameterDereferenceable));
        assert_eq!(ChoiceKind::from_code('F'), Ok(ChoiceKind::LoopBackedgeTaken));
    }

    #[test]
    fn test_unknown_codes_rejected() {
        for code in ['0', 'G', 'z', '#', ' ', '/'] {
            assert_eq!(
                ChoiceKind::from_code(code),
                Err(KindError::UnknownCode { code })
            );
        }
        assert_eq!(ChoiceKind::from_ordinal(0), Err(KindError::UnknownOrdinal(0)));
        assert_eq!(ChoiceKind::from_ordinal(23), Err(KindError::UnknownOrdinal(23)));
    }

    #[test]
    fn test_cardinality_by_shape() {
        assert_eq!(ChoiceKind::InboundsGep.cardinality(SiteShape::Plain), 2);
        assert_eq!(ChoiceKind::ParameterMemBehavior.cardinality(SiteShape::Plain), 4);
        assert_eq!(ChoiceKind::FunctionMemEffects.cardinality(SiteShape::Plain), 14);
        assert_eq!(
            ChoiceKind::FunctionMemEffects.cardinality(SiteShape::AssumeIntrinsic),
            8
        );
        assert_eq!(
            ChoiceKind::ParameterReturned.cardinality(SiteShape::ReturnCandidates(2)),
            3
        );
        assert_eq!(
            ChoiceKind::ControlFlowTarget.cardinality(SiteShape::SpeculatedConstants(1)),
            2
        );
        // Site-dependent kinds without their shape have nothing to choose from.
        assert_eq!(ChoiceKind::ControlFlowTarget.cardinality(SiteShape::Plain), 0);
    }

    #[test]
    fn test_labels_unique() {
        for kind in ChoiceKind::ALL {
            assert_eq!(ChoiceKind::from_label(kind.label()), Some(kind));
        }
    }

    #[test]
    fn test_kind_is_one_byte() {
        assert_eq!(std::mem::size_of::<ChoiceKind>(), 1);
    }
}
