//! `voipbill-core`: shared domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod document;
pub mod error;
pub mod id;

pub use document::{DocumentKey, DocumentKind, Fingerprinted, format_period_date};
pub use error::{DomainError, DomainResult};
pub use id::{CustomerCode, DocumentCode, ProductCode, RunId, uncode};
