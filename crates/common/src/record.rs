//! # Choice Records
//!
//! One resolved decision, as printed by the oracle's diagnostics and scraped
//! back by `control-bake`. The text form is lossless:
//!
//! ```text
//! [OC][2][1][6][0][1][default][GEP][Inbounds ] @ arrayidx in main
//! ```

use crate::kind::ChoiceKind;
use std::fmt;
use std::str::FromStr;

/// Which resolution layer produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The position slot was already filled (seeded or resolved earlier).
    Slot,
    /// Copied from the per-kind name cache.
    Cache,
    /// Computed by the default policy. These are the "opportunities".
    Default,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Slot => "slot",
            Origin::Cache => "cache",
            Origin::Default => "default",
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Origin> {
        match v {
            0 => Some(Origin::Slot),
            1 => Some(Origin::Cache),
            2 => Some(Origin::Default),
            _ => None,
        }
    }
}

impl FromStr for Origin {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slot" => Ok(Origin::Slot),
            "cache" => Ok(Origin::Cache),
            "default" => Ok(Origin::Default),
            other => Err(RecordParseError::UnknownOrigin(other.to_string())),
        }
    }
}

/// A single resolved (kind, function, position) decision.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChoiceRecord {
    pub cardinality: u32,
    /// 0-based choice, as returned to the applier.
    pub choice: u32,
    pub kind: ChoiceKind,
    pub function: u32,
    /// 1-based position of the site within its (kind, function) stream.
    pub position: u32,
    pub site: String,
    pub function_name: String,
    pub origin: Origin,
}

/// Errors from parsing a trace line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordParseError {
    #[error("not a choice line (missing [OC] prefix)")]
    MissingPrefix,
    #[error("malformed field {0}")]
    MalformedField(&'static str),
    #[error("unknown kind label {0:?}")]
    UnknownLabel(String),
    #[error("kind ordinal {ordinal} does not match label {label:?}")]
    KindMismatch { ordinal: u8, label: String },
    #[error("unknown origin {0:?}")]
    UnknownOrigin(String),
}

impl fmt::Display for ChoiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[OC][{}][{}][{}][{}][{}][{}]{} @ {} in {}",
            self.cardinality,
            self.choice,
            self.kind.ordinal(),
            self.function,
            self.position,
            self.origin.as_str(),
            self.kind.label(),
            self.site,
            self.function_name
        )
    }
}

/// Splits one `[field]` off the front of `s`.
fn take_bracket<'a>(s: &'a str, field: &'static str) -> Result<(&'a str, &'a str), RecordParseError> {
    let rest = s
        .strip_prefix('[')
        .ok_or(RecordParseError::MalformedField(field))?;
    let end = rest.find(']').ok_or(RecordParseError::MalformedField(field))?;
    Ok((&rest[..end], &rest[end + 1..]))
}

fn take_number<'a>(s: &'a str, field: &'static str) -> Result<(u32, &'a str), RecordParseError> {
    let (raw, rest) = take_bracket(s, field)?;
    let value = raw
        .parse()
        .map_err(|_| RecordParseError::MalformedField(field))?;
    Ok((value, rest))
}

impl FromStr for ChoiceRecord {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let rest = line
            .trim_end()
            .strip_prefix("[OC]")
            .ok_or(RecordParseError::MissingPrefix)?;
        let (cardinality, rest) = take_number(rest, "cardinality")?;
        let (choice, rest) = take_number(rest, "choice")?;
        let (ordinal, rest) = take_number(rest, "kind")?;
        let (function, rest) = take_number(rest, "function")?;
        let (position, rest) = take_number(rest, "position")?;
        let (origin, rest) = take_bracket(rest, "origin")?;
        let origin: Origin = origin.parse()?;

        let (label, rest) = rest
            .split_once(" @ ")
            .ok_or(RecordParseError::MalformedField("site"))?;
        let kind = ChoiceKind::from_label(label)
            .ok_or_else(|| RecordParseError::UnknownLabel(label.to_string()))?;
        if u32::from(kind.ordinal()) != ordinal {
            return Err(RecordParseError::KindMismatch {
                ordinal: u8::try_from(ordinal).unwrap_or(u8::MAX),
                label: label.to_string(),
            });
        }
        let (site, function_name) = rest
            .rsplit_once(" in ")
            .ok_or(RecordParseError::MalformedField("function name"))?;

        Ok(ChoiceRecord {
            cardinality,
            choice,
            kind,
            function,
            position,
            site: site.to_string(),
            function_name: function_name.to_string(),
            origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChoiceRecord {
        ChoiceRecord {
            cardinality: 2,
            choice: 1,
            kind: ChoiceKind::InboundsGep,
            function: 0,
            position: 1,
            site: "arrayidx".into(),
            function_name: "main".into(),
            origin: Origin::Default,
        }
    }

    #[test]
    fn test_display_format() {
        assert_eq!(
            sample().to_string(),
            "[OC][2][1][6][0][1][default][GEP][Inbounds ] @ arrayidx in main"
        );
    }

    #[test]
    fn test_parse_display_line() {
        let line = "[OC][14][13][21][3][2][slot][Fn][MemEffects] @ compute.inner in compute.inner";
        let record: ChoiceRecord = line.parse().unwrap();
        assert_eq!(record.kind, ChoiceKind::FunctionMemEffects);
        assert_eq!(record.function, 3);
        assert_eq!(record.position, 2);
        assert_eq!(record.site, "compute.inner");
        assert_eq!(record.origin, Origin::Slot);
        assert_eq!(record.to_string(), line);
    }

    #[test]
    fn test_site_names_with_store_prefix() {
        let mut record = sample();
        record.site = "__s.arrayidx".into();
        record.kind = ChoiceKind::MemoryAccessAlign;
        record.cardinality = 3;
        let parsed: ChoiceRecord = record.to_string().parse().unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_rejects_foreign_lines() {
        assert_eq!(
            "warning: something".parse::<ChoiceRecord>(),
            Err(RecordParseError::MissingPrefix)
        );
        assert!("[OC][2][x][6][0][1][slot][GEP][Inbounds ] @ v in f"
            .parse::<ChoiceRecord>()
            .is_err());
    }

    #[test]
    fn test_rejects_label_ordinal_mismatch() {
        let err = "[OC][2][0][5][0][1][cache][GEP][Inbounds ] @ v in f"
            .parse::<ChoiceRecord>()
            .unwrap_err();
        assert!(matches!(err, RecordParseError::KindMismatch { ordinal: 5, .. }));
    }
}
