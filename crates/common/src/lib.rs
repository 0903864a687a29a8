//! Shared vocabulary of the optimist workspace: the choice-kind registry,
//! run configuration, choice records and the persisted choice ledger.

pub mod config;
pub mod kind;
pub mod ledger;
pub mod record;

pub use config::{AnnotatorConfig, ConfigError, FunctionFilter};
pub use kind::{ChoiceKind, KindError, SiteShape, MAX_CARDINALITY};
pub use ledger::{ChoiceLedger, LedgerEntry, LedgerError, MappedLedger};
pub use record::{ChoiceRecord, Origin, RecordParseError};
