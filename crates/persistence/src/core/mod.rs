//! Core storage traits.
//!
//! - [`SiloStore`] - Pooled backend that hands out silo-bound sessions
//! - [`SiloSession`] - One transaction with an active silo binding
//! - [`BackendKind`] - Backend identification and placeholder dialect

mod backend;
mod session;

pub use backend::BackendKind;
pub use session::{SiloSession, SiloStore};
