//! Engine modules — the migration workflow itself.
//!
//! The engine is pure state and logic: it renders the step list from the
//! session state, gates dispatch, and folds run results back into state.
//! Running processes is left to `crate::runner` and `crate::executor`.

pub mod parser;
pub mod session;
pub mod state;
pub mod steps;
