//! Replay module - Stepping through AI-suggested fixes
//!
//! A replay session holds an ordered list of fix steps, a cursor, and an
//! autoplay flag. Navigation is clamped, never wrapped; diffs are a
//! line-presence summary against the previous step.

pub mod controller;
pub mod diff;

pub use controller::{drive_autoplay, AcceptedFix, ReplayController, ReplayStep};
pub use diff::{line_diff, LineDiff};
