pub mod log;
pub mod shell;
