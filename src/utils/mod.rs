//! Shared helpers

pub mod gid;
