//! # Repolens
//!
//! A local, incremental semantic index over a source repository and its
//! git history. Two vector-searchable surfaces (code chunks and history
//! chunks) feed a signal-detection pipeline that derives durable,
//! directory-scoped judgments — stability, ownership, churn, adoption
//! cycles, breaking changes, fix chains — and a pre-change assessment
//! query built on top of them.
//!
//! ## Architecture
//!
//! The crate is organized following Domain-Driven Design principles:
//!
//! - `domain`: Core models (chunks, signals, profiles, filters) and errors
//! - `application`: Interfaces and use-case orchestration
//! - `connector`: External integrations (tree-sitter chunkers, git,
//!   embedding providers, DuckDB storage, signal detectors)

pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

// Re-export commonly used types
pub use application::*;
pub use connector::*;
pub use domain::*;
