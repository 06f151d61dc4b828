//! CLI command implementations.

pub mod info;
pub mod init;
pub mod play;
pub mod sessions;
