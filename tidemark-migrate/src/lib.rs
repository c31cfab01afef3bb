//! Tidemark Migration Library
//!
//! Schema units and table shapes for the API-key gateway, plus the helpers the
//! `tidemark-migrate` CLI (main.rs) is built from.

pub mod generate;
pub mod migrations;
pub mod models;

pub use migrations::registry;
