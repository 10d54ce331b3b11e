//! # llm-seo-monitor
//!
//! Measures how often LLM answers mention a target brand and its
//! competitors, and how early in the answer they appear.
//!
//! ## Pipeline
//!
//! - [`queries`] expands templates into questions
//! - [`runner`] asks them through the [`gateway`] and stores one output per
//!   question in a run ([`store`])
//! - [`analysis`] detects and scores mentions in a run's answers
//!
//! ## Quick Start
//!
//! ```rust
//! use llm_seo_monitor::analysis::{detect_mentions, Brand, BrandRegistry};
//!
//! let registry = BrandRegistry {
//!     target: Brand::new("Obsidian", ["Obsidian"]),
//!     competitors: vec![Brand::new("Notion", ["Notion"])],
//! };
//! let mentions = detect_mentions("Obsidian or Notion? Obsidian.", &registry).unwrap();
//! assert_eq!(mentions[0].count, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod queries;
pub mod runner;
pub mod store;
pub mod utils;

pub use crate::cli::Cli;

/// The current version of llm-seo-monitor.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
