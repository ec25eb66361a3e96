//! Interactive terminal assistant.

pub mod command;
pub mod history;
pub mod repl;
pub mod session;
pub mod shell;

pub use repl::Repl;
pub use session::Session;
