//! Tradeboard validate - Schema validation of uploaded tables
//!
//! This crate turns raw uploaded bytes into either a typed dataset or a
//! validation report:
//! - Delimited-text decoding
//! - Fixed text-to-type coercion rules
//! - Contract checks (presence, types, nulls, row rules, keys)

pub mod coerce;
pub mod decode;
pub mod input;
pub mod validator;

pub use decode::{decode, DecodeError, Decoded, RawTable};
pub use input::RawInput;
pub use validator::{Checked, ValidateError, Validator};
