//! Reassembly of recorded decisions into control strings.

use crate::error::EncodeError;
use crate::token::decision_char;
use common::{ChoiceKind, ChoiceRecord};
use std::collections::BTreeMap;

/// Collects `(kind, function, position) -> choice` and emits control strings.
///
/// Output is ordered by kind, then function, then position: `#f<n>f` is
/// emitted whenever the function changes and `#c<code>` whenever the kind
/// changes, so the decoder's push order reproduces every position.
#[derive(Debug, Clone, Default)]
pub struct ControlStringBuilder {
    entries: BTreeMap<(ChoiceKind, u32, u32), u32>,
}

impl ControlStringBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one 0-based choice at a 1-based position.
    ///
    /// Re-adding the same choice is a no-op; a different one is a conflict.
    pub fn push(
        &mut self,
        kind: ChoiceKind,
        function: u32,
        position: u32,
        choice: u32,
    ) -> Result<(), EncodeError> {
        if decision_char(choice + 1).is_none() {
            return Err(EncodeError::ChoiceOutOfRange {
                kind,
                function,
                position,
                choice,
            });
        }
        match self.entries.insert((kind, function, position), choice) {
            Some(first) if first != choice => Err(EncodeError::Conflict {
                kind,
                function,
                position,
                first,
                second: choice,
            }),
            _ => Ok(()),
        }
    }

    pub fn push_record(&mut self, record: &ChoiceRecord) -> Result<(), EncodeError> {
        self.push(record.kind, record.function, record.position, record.choice)
    }

    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a ChoiceRecord>,
    ) -> Result<Self, EncodeError> {
        let mut builder = Self::new();
        for record in records {
            builder.push_record(record)?;
        }
        Ok(builder)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Function ordinals with at least one decision, ascending.
    pub fn functions(&self) -> Vec<u32> {
        let mut functions: Vec<u32> = self.entries.keys().map(|&(_, f, _)| f).collect();
        functions.sort_unstable();
        functions.dedup();
        functions
    }

    /// Emits the global control string.
    ///
    /// # Examples
    /// ```
    /// use codec::ControlStringBuilder;
    /// use common::ChoiceKind;
    ///
    /// let mut builder = ControlStringBuilder::new();
    /// builder.push(ChoiceKind::InboundsGep, 0, 2, 0).unwrap();
    /// builder.push(ChoiceKind::InboundsGep, 0, 1, 1).unwrap();
    /// assert_eq!(builder.build().unwrap(), "#f0f#c610");
    /// ```
    pub fn build(&self) -> Result<String, EncodeError> {
        let mut out = String::new();
        let mut last_function = None;
        let mut last_kind = None;
        let mut expected = 1;
        for (&(kind, function, position), &choice) in &self.entries {
            if last_function != Some(function) || last_kind != Some(kind) {
                expected = 1;
            }
            check_position(kind, function, position, expected)?;
            if last_function != Some(function) {
                out.push_str(&format!("#f{function}f"));
                last_function = Some(function);
            }
            if last_kind != Some(kind) {
                out.push('#');
                out.push('c');
                out.push(kind.code());
                last_kind = Some(kind);
            }
            push_choice(&mut out, choice);
            expected = position + 1;
        }
        Ok(out)
    }

    /// Emits the per-function embedded form: `#c<code><choices>` per kind.
    pub fn embedded_for(&self, function: u32) -> Result<String, EncodeError> {
        let mut out = String::new();
        let mut last_kind = None;
        let mut expected = 1;
        for (&(kind, f, position), &choice) in &self.entries {
            if f != function {
                continue;
            }
            if last_kind != Some(kind) {
                out.push('#');
                out.push('c');
                out.push(kind.code());
                last_kind = Some(kind);
                expected = 1;
            }
            check_position(kind, function, position, expected)?;
            push_choice(&mut out, choice);
            expected = position + 1;
        }
        Ok(out)
    }
}

fn check_position(kind: ChoiceKind, function: u32, position: u32, expected: u32) -> Result<(), EncodeError> {
    if position == expected {
        Ok(())
    } else {
        Err(EncodeError::PositionGap {
            kind,
            function,
            missing: expected,
            next: position,
        })
    }
}

fn push_choice(out: &mut String, choice: u32) {
    // Range was checked on insertion.
    if let Some(ch) = decision_char(choice + 1) {
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{decode_embedded, decode_global};

    #[test]
    fn test_function_and_kind_switches() {
        let mut b = ControlStringBuilder::new();
        b.push(ChoiceKind::ParameterNoAlias, 1, 1, 1).unwrap();
        b.push(ChoiceKind::ParameterNoAlias, 0, 1, 0).unwrap();
        b.push(ChoiceKind::InboundsGep, 1, 1, 1).unwrap();
        b.push(ChoiceKind::FunctionMemEffects, 1, 1, 13).unwrap();
        assert_eq!(b.build().unwrap(), "#f0f#c10#f1f1#c61#cE=");
    }

    #[test]
    fn test_global_string_decodes_back_in_order() {
        let mut b = ControlStringBuilder::new();
        for (position, choice) in [(3, 2), (1, 0), (2, 1)] {
            b.push(ChoiceKind::ParameterAligned, 4, position, choice).unwrap();
        }
        b.push(ChoiceKind::InboundsGep, 2, 1, 1).unwrap();
        let control = b.build().unwrap();
        let seeds = decode_global(&control).unwrap();
        let decoded: Vec<(ChoiceKind, u32, u32)> = seeds
            .iter()
            .map(|s| (s.kind, s.function, s.choice()))
            .collect();
        assert_eq!(
            decoded,
            vec![
                (ChoiceKind::InboundsGep, 2, 1),
                (ChoiceKind::ParameterAligned, 4, 0),
                (ChoiceKind::ParameterAligned, 4, 1),
                (ChoiceKind::ParameterAligned, 4, 2),
            ]
        );
    }

    #[test]
    fn test_gap_is_rejected() {
        let mut b = ControlStringBuilder::new();
        b.push(ChoiceKind::InboundsGep, 0, 1, 1).unwrap();
        b.push(ChoiceKind::InboundsGep, 0, 3, 1).unwrap();
        assert_eq!(
            b.build(),
            Err(EncodeError::PositionGap {
                kind: ChoiceKind::InboundsGep,
                function: 0,
                missing: 2,
                next: 3,
            })
        );
    }

    #[test]
    fn test_stream_must_start_at_one() {
        let mut b = ControlStringBuilder::new();
        b.push(ChoiceKind::InboundsGep, 0, 1, 1).unwrap();
        b.push(ChoiceKind::InboundsGep, 1, 2, 1).unwrap();
        assert!(matches!(b.build(), Err(EncodeError::PositionGap { function: 1, missing: 1, .. })));
    }

    #[test]
    fn test_conflicts_and_range() {
        let mut b = ControlStringBuilder::new();
        b.push(ChoiceKind::InboundsGep, 0, 1, 1).unwrap();
        b.push(ChoiceKind::InboundsGep, 0, 1, 1).unwrap();
        assert!(matches!(
            b.push(ChoiceKind::InboundsGep, 0, 1, 0),
            Err(EncodeError::Conflict { first: 1, second: 0, .. })
        ));
        assert!(matches!(
            b.push(ChoiceKind::FunctionMemEffects, 0, 1, 14),
            Err(EncodeError::ChoiceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_embedded_form() {
        let mut b = ControlStringBuilder::new();
        b.push(ChoiceKind::ParameterNoAlias, 3, 1, 1).unwrap();
        b.push(ChoiceKind::ParameterNoAlias, 3, 2, 0).unwrap();
        b.push(ChoiceKind::OverflowNoSignedWrap, 3, 1, 1).unwrap();
        b.push(ChoiceKind::OverflowNoSignedWrap, 5, 1, 0).unwrap();
        let embedded = b.embedded_for(3).unwrap();
        assert_eq!(embedded, "#c110#c41");
        assert_eq!(decode_embedded(&embedded, 3).unwrap().len(), 3);
        assert_eq!(b.embedded_for(9).unwrap(), "");
        assert_eq!(b.functions(), vec![3, 5]);
    }
}
