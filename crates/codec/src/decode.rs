//! Decoding of global and per-function control strings into seed decisions.

use crate::error::CodecError;
use crate::token::{Mode, Token, Tokenizer};
use common::ChoiceKind;

/// One decision to append to the (kind, function) choice map.
///
/// Seeds carry no position: each is pushed onto the next unused slot,
/// so order within a (kind, function) stream is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededChoice {
    pub kind: ChoiceKind,
    pub function: u32,
    /// 1-based decision.
    pub decision: u8,
}

impl SeededChoice {
    /// 0-based choice as seen by appliers.
    pub fn choice(&self) -> u32 {
        u32::from(self.decision) - 1
    }
}

fn decode(input: &str, mode: Mode, mut function: Option<u32>) -> Result<Vec<SeededChoice>, CodecError> {
    let mut kind = None;
    let mut seeds = Vec::new();
    for item in Tokenizer::new(input, mode) {
        let (offset, token) = item?;
        match token {
            Token::SelectKind(k) => kind = Some(k),
            Token::SelectFunction(f) => function = Some(f),
            Token::Decision(decision) => {
                let kind = kind.ok_or(CodecError::NoActiveKind { offset })?;
                let function = function.ok_or(CodecError::NoActiveFunction { offset })?;
                seeds.push(SeededChoice {
                    kind,
                    function,
                    decision,
                });
            }
        }
    }
    Ok(seeds)
}

/// Decodes the global control string.
///
/// # Examples
/// ```
/// use codec::decode_global;
/// use common::ChoiceKind;
///
/// let seeds = decode_global("#f0f#c622").unwrap();
/// assert_eq!(seeds.len(), 2);
/// assert!(seeds.iter().all(|s| s.kind == ChoiceKind::InboundsGep && s.choice() == 2));
/// ```
pub fn decode_global(input: &str) -> Result<Vec<SeededChoice>, CodecError> {
    decode(input, Mode::Global, None)
}

/// Decodes data embedded for the function with the given ordinal.
///
/// A single trailing NUL (C string initializers keep theirs) is ignored.
pub fn decode_embedded(input: &str, function: u32) -> Result<Vec<SeededChoice>, CodecError> {
    let input = input.strip_suffix('\0').unwrap_or(input);
    decode(input, Mode::Embedded, Some(function))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_two_decisions_for_function_zero() {
        let seeds = decode_global("#f0f#c622").unwrap();
        assert_eq!(
            seeds,
            vec![
                SeededChoice { kind: ChoiceKind::InboundsGep, function: 0, decision: 3 },
                SeededChoice { kind: ChoiceKind::InboundsGep, function: 0, decision: 3 },
            ]
        );
        // Character '2' is decision 3, the third choice.
        assert!(seeds.iter().all(|s| s.choice() == 2));
    }

    #[test]
    fn test_kind_persists_across_function_switch() {
        let seeds = decode_global("#f0f#c<1#f2f0").unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].kind, ChoiceKind::ParameterDereferenceable);
        assert_eq!(seeds[1].function, 2);
        assert_eq!(seeds[1].choice(), 0);
    }

    #[test]
    fn test_empty_strings() {
        assert!(decode_global("").unwrap().is_empty());
        assert!(decode_embedded("\0", 3).unwrap().is_empty());
    }

    #[test]
    fn test_embedded_uses_implicit_function() {
        let seeds = decode_embedded("#c11#c40\0", 7).unwrap();
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|s| s.function == 7));
        assert_eq!(seeds[0].kind, ChoiceKind::ParameterNoAlias);
        assert_eq!(seeds[1].kind, ChoiceKind::OverflowNoSignedWrap);
    }

    #[test]
    fn test_embedded_only_strips_one_nul() {
        let err = decode_embedded("#c1\0\0", 0).unwrap_err();
        assert_eq!(err, CodecError::InvalidDecision { offset: 3, found: '\0' });
    }

    #[test]
    fn test_missing_selectors() {
        assert_eq!(
            decode_global("#c61"),
            Err(CodecError::NoActiveFunction { offset: 3 })
        );
        assert_eq!(
            decode_global("#f0f1"),
            Err(CodecError::NoActiveKind { offset: 4 })
        );
        assert_eq!(
            decode_embedded("1", 0),
            Err(CodecError::NoActiveKind { offset: 0 })
        );
    }

    #[test]
    fn test_errors_report_offsets() {
        let err = decode_global("#f0f#c6111#q").unwrap_err();
        assert_eq!(err.offset(), 11);
    }
}
