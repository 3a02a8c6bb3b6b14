//! One-shot CLI commands.

pub mod status;
