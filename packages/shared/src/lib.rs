//! Shared utilities for the Kizuna chat client workspace.

pub mod logger;
pub mod time;
