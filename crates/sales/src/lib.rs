//! Sales domain module (usage orders).
//!
//! Orders are draft accounting documents holding not-yet-invoiced usage.
//! This crate turns one usage record into an order draft and models the
//! persisted order's `prepared -> done` lifecycle; persistence lives in infra.

pub mod order;

pub use order::{
    LineItem, Order, OrderDraft, OrderPolicy, OrderState, USAGE_LABEL, inline_customer,
    service_description,
};
