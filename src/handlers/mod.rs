//! Resource handlers.
//!
//! One module per resource. Each handler resolves the caller through the
//! `AuthUser` extractor, asks the policy before touching the store, and
//! returns `AppError` for every non-success outcome.

pub mod cart;
pub mod categories;
pub mod menu_items;
pub mod orders;
pub mod users;
