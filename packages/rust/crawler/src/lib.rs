//! Profile retrieval and descendant traversal.
//!
//! This crate provides:
//! - [`source`]: Page sources (HTTP and in-memory)
//! - [`parsers`]: Ordered parser chain turning a page into a [`Profile`](lineage_shared::Profile)
//! - [`fetcher`]: Rate-limited, per-run cached profile fetching
//! - [`traversal`]: Bounded breadth-first walk over a root's descendants

pub mod fetcher;
pub mod parsers;
pub mod source;
pub mod traversal;

pub use fetcher::{ProfileFetcher, RateLimiter};
pub use parsers::{LinkPatternParser, MicrodataParser, ParserChain, ProfileFields, ProfileParser};
pub use source::{HttpPageSource, MemoryPageSource, PageSource};
pub use traversal::{CrawlContext, DiscoveredNode, Traversal, TraversalStats, traverse};
