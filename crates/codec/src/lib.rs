//! # Control-String Codec
//!
//! A control string is a flat character stream that seeds the decision
//! oracle's choice maps:
//!
//! - `#c<code>` selects the active choice kind (see [`common::ChoiceKind::code`]),
//! - `#f<digits>f` selects the active function ordinal (global strings only),
//! - any other character `ch` in `'0'..='='` appends decision `ch - '0' + 1`
//!   to the active (kind, function) stream.
//!
//! Strings are machine generated, so every malformation is a fatal
//! [`CodecError`] carrying the byte offset where decoding stopped.
//!
//! ## Example
//! ```
//! use codec::{decode_global, ControlStringBuilder};
//!
//! let seeds = decode_global("#f0f#c611#f3f#c<2").unwrap();
//! let mut builder = ControlStringBuilder::new();
//! let mut positions = std::collections::HashMap::new();
//! for seed in &seeds {
//!     let position = positions.entry((seed.kind, seed.function)).or_insert(0);
//!     *position += 1;
//!     builder.push(seed.kind, seed.function, *position, seed.choice()).unwrap();
//! }
//! assert_eq!(builder.build().unwrap(), "#f0f#c611#f3f#c<2");
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod token;

pub use decode::{decode_embedded, decode_global, SeededChoice};
pub use encode::ControlStringBuilder;
pub use error::{CodecError, EncodeError};
pub use token::{decision_char, decision_value, Mode, Token, Tokenizer};
