//! Run orchestration for the lineage crawler.
//!
//! This crate ties together profile fetching, traversal, evidence scoring,
//! and persistence into the end-to-end `map` workflow
//! ([`map_descendants`]).

pub mod orchestrator;

pub use orchestrator::{
    CrawlSummary, FailedNode, MapRequest, NodeSummary, ProgressReporter, SilentProgress,
    build_record, map_descendants,
};
