//! # Runbox
//!
//! A sandboxed code-execution service built with Rust.
//!
//! ## Features
//!
//! - **Heuristic Classification:** Detects Python, HTML, CSS, and JavaScript
//!   variants from raw pasted source
//! - **Structural Linting:** HTML tag balance and CSS statement checks that
//!   short-circuit obviously broken input before execution
//! - **Isolated Execution:** Untrusted code runs in a worker over a
//!   message channel with a readiness handshake and a single terminal
//!   completion signal
//! - **Fix Replay:** AI-suggested fixes are stepped through, diffed, and
//!   accepted or cancelled as a unit

pub mod classify;
pub mod collab;
pub mod config;
pub mod error;
pub mod handoff;
pub mod lint;
pub mod replay;
pub mod sandbox;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
