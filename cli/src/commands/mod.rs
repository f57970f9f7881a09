//! Command implementations for the pash CLI

#[cfg(feature = "map")] pub mod map;
pub mod config;
