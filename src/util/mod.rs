//! Filesystem utilities.

pub mod fs;
