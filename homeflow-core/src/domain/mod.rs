//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod transaction;
pub mod result;

pub use account::Account;
pub use transaction::{Transaction, TransactionKind};
