pub mod console_vars;

pub use console_vars::{CVar, ConsoleVariables};
