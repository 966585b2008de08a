//! Parties domain module (accounting customers).
//!
//! Customers live in the accounting system's address book. This crate only
//! models what the reconciliation needs: the loaded party, an inline draft for
//! customers the address book does not know yet, and the reference an order
//! binds to.

pub mod party;

pub use party::{Address, CustomerRef, Party, PartyDraft};
