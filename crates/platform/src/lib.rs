//! Platform detection and node facts for buildenv
//!
//! This crate provides the host-side inputs to environment injection:
//! - Node identity (platform label, hostname, username)
//! - A snapshot of the process environment

mod error;
mod node;

pub use error::PlatformError;
pub use node::{NodeInfo, platform_label, system_env};
