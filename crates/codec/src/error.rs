use common::ChoiceKind;

/// Fatal control-string parse errors. Offsets are byte offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("truncated escape at offset {offset}")]
    TruncatedEscape { offset: usize },
    #[error("unknown escape '#{escape}' at offset {offset}")]
    UnknownEscape { offset: usize, escape: char },
    #[error("unknown choice-kind code {code:?} at offset {offset}")]
    UnknownKindCode { offset: usize, code: char },
    #[error("empty function number at offset {offset}")]
    EmptyFunctionNumber { offset: usize },
    #[error("function number not closed by 'f' at offset {offset} (found {found:?})")]
    UnterminatedFunctionNumber { offset: usize, found: Option<char> },
    #[error("function number out of range at offset {offset}")]
    FunctionNumberOverflow { offset: usize },
    #[error("function switch in per-function data at offset {offset}")]
    FunctionSwitchInEmbedded { offset: usize },
    #[error("decision before any '#c' kind selector at offset {offset}")]
    NoActiveKind { offset: usize },
    #[error("decision before any '#f' function selector at offset {offset}")]
    NoActiveFunction { offset: usize },
    #[error("invalid decision character {found:?} at offset {offset}")]
    InvalidDecision { offset: usize, found: char },
}

impl CodecError {
    pub fn offset(&self) -> usize {
        match *self {
            CodecError::TruncatedEscape { offset }
            | CodecError::UnknownEscape { offset, .. }
            | CodecError::UnknownKindCode { offset, .. }
            | CodecError::EmptyFunctionNumber { offset }
            | CodecError::UnterminatedFunctionNumber { offset, .. }
            | CodecError::FunctionNumberOverflow { offset }
            | CodecError::FunctionSwitchInEmbedded { offset }
            | CodecError::NoActiveKind { offset }
            | CodecError::NoActiveFunction { offset }
            | CodecError::InvalidDecision { offset, .. } => offset,
        }
    }
}

/// Errors from reassembling decisions into a control string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("{kind} in function {function}: position {missing} missing before {next}")]
    PositionGap {
        kind: ChoiceKind,
        function: u32,
        missing: u32,
        next: u32,
    },
    #[error("{kind} in function {function} position {position}: choice {choice} not encodable")]
    ChoiceOutOfRange {
        kind: ChoiceKind,
        function: u32,
        position: u32,
        choice: u32,
    },
    #[error("{kind} in function {function} position {position}: conflicting choices {first} and {second}")]
    Conflict {
        kind: ChoiceKind,
        function: u32,
        position: u32,
        first: u32,
        second: u32,
    },
}
