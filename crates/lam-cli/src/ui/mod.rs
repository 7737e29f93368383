//! UI Module - terminal output
//!
//! - [`theme`] - Colors, icons and size formatting
//! - [`actor`] - Message-passing print loop
//! - [`output`] - Public API for commands, also the core's `Reporter`
//! - [`table`] - Addon and orphan tables

pub mod actor;
pub mod output;
pub mod table;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
