//! # Common Components
//!
//! Shared utilities and data structures used by both the client pipeline and the proxy server.
//!
//! ## Modules
//!
//! - [`messages`]: Backend response envelope, diagnosis validation and the proxy error body
//! - [`config`]: Configuration parsing utilities
//! - [`logging`]: Logger setup shared by the binaries

pub mod messages;
pub mod config;
pub mod logging;
