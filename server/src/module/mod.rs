//! Module configuration intake
//!
//! [`ModuleConfigStore`] keeps versioned key-values per module and hands
//! the changed keys to [`ModuleCallback`], which drives the engine.

mod callback;
mod store;

pub use callback::{CallbackError, CallbackResult, ModuleCallback, ModuleNotification};
pub use store::{ModuleConfigStore, UpdateOutcome};
