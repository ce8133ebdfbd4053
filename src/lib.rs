pub mod cli;
pub mod command;
pub mod internal;
pub mod utils;
