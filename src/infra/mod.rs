//! Infrastructure layer
//!
//! Handles all I/O with the outside world: external processes, git
//! repositories, Python environments and cache directories.

pub mod dirs;
pub mod git;
pub mod process;
pub mod python;
pub mod workspace;
