//! Single-pass tokenizer over a control string.

use crate::error::CodecError;
use common::ChoiceKind;

/// Highest decision character: `'0'` plus the widest cardinality minus one.
pub const MAX_DECISION_CHAR: char = '=';

/// Which grammar the input is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The global control string; may switch functions with `#f<n>f`.
    Global,
    /// Data embedded for one function; the function is implicit.
    Embedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    SelectKind(ChoiceKind),
    SelectFunction(u32),
    /// A 1-based decision.
    Decision(u8),
}

/// Decision character for a 1-based decision.
///
/// # Examples
/// ```
/// assert_eq!(codec::decision_char(1), Some('0'));
/// assert_eq!(codec::decision_char(14), Some('='));
/// assert_eq!(codec::decision_char(0), None);
/// ```
pub fn decision_char(decision: u32) -> Option<char> {
    if (1..=common::MAX_CARDINALITY).contains(&decision) {
        char::from_u32('0' as u32 + decision - 1)
    } else {
        None
    }
}

/// 1-based decision encoded by `ch`, if it is a decision character.
pub fn decision_value(ch: char) -> Option<u8> {
    if ('0'..=MAX_DECISION_CHAR).contains(&ch) {
        Some(ch as u8 - b'0' + 1)
    } else {
        None
    }
}

/// Yields `(byte offset, token)` pairs; stops at the first error.
pub struct Tokenizer<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    mode: Mode,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, mode: Mode) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            mode,
            failed: false,
        }
    }

    fn escape(&mut self, start: usize) -> Result<Token, CodecError> {
        let (offset, selector) = self
            .chars
            .next()
            .ok_or(CodecError::TruncatedEscape { offset: start })?;
        match selector {
            'c' => {
                let (code_offset, code) = self
                    .chars
                    .next()
                    .ok_or(CodecError::TruncatedEscape { offset: start })?;
                ChoiceKind::from_code(code)
                    .map(Token::SelectKind)
                    .map_err(|_| CodecError::UnknownKindCode {
                        offset: code_offset,
                        code,
                    })
            }
            'f' if self.mode == Mode::Embedded => {
                Err(CodecError::FunctionSwitchInEmbedded { offset: start })
            }
            'f' => self.function_number(start, offset + 1),
            other => Err(CodecError::UnknownEscape {
                offset,
                escape: other,
            }),
        }
    }

    /// Reads `<digits>f` after `#f`; `digits_start` is the offset of the first digit.
    fn function_number(&mut self, start: usize, digits_start: usize) -> Result<Token, CodecError> {
        loop {
            match self.chars.next() {
                Some((end, 'f')) => {
                    let digits = &self.input[digits_start..end];
                    if digits.is_empty() {
                        return Err(CodecError::EmptyFunctionNumber { offset: start });
                    }
                    return digits
                        .parse()
                        .map(Token::SelectFunction)
                        .map_err(|_| CodecError::FunctionNumberOverflow { offset: start });
                }
                Some((_, c)) if c.is_ascii_digit() => continue,
                Some((offset, found)) => {
                    return Err(CodecError::UnterminatedFunctionNumber {
                        offset,
                        found: Some(found),
                    })
                }
                None => {
                    return Err(CodecError::UnterminatedFunctionNumber {
                        offset: self.input.len(),
                        found: None,
                    })
                }
            }
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<(usize, Token), CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (offset, ch) = self.chars.next()?;
        let result = if ch == '#' {
            self.escape(offset)
        } else {
            decision_value(ch)
                .map(Token::Decision)
                .ok_or(CodecError::InvalidDecision { offset, found: ch })
        };
        if result.is_err() {
            self.failed = true;
        }
        Some(result.map(|token| (offset, token)))
    }
}
