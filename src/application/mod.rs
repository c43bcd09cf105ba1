// Application layer: the transfer engine and its error taxonomy.
// Callers (the CLI, or any transport) talk to `LedgerEngine` only.

pub mod config;
pub mod engine;
pub mod error;

pub use config::*;
pub use engine::*;
pub use error::*;
