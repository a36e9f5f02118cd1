//! Shared types, error model, and configuration for the lineage crawler.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`LineageError`]: the unified error type
//! - Domain types ([`Profile`], [`DescendantRecord`], [`ConfidenceFactors`], [`RunId`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSettings, ID_PLACEHOLDER, PrivacyConfig, SourceConfig,
    StorageConfig, config_dir, config_file_path, db_path, init_config, load_config,
    load_config_from,
};
pub use error::{LineageError, Result};
pub use types::{
    ChildRef, ConfidenceFactors, DISCOVERED_VIA_CRAWLER, DescendantRecord, LineageStatus,
    LivingEstimate, OwnerRef, Profile, RunId, relationship_label,
};
