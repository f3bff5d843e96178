//! Command implementations.

pub mod archive;
pub mod discover;
mod helpers;
pub mod init;
pub mod run;
pub mod status;
