//! Pure evidence functions used while crawling.
//!
//! - [`dates`]: free-text date normalization
//! - [`living`]: tiered living-status estimation
//! - [`confidence`]: weighted trust score and status tier

pub mod confidence;
pub mod dates;
pub mod living;

pub use confidence::{ConfidenceAssessment, score, status_for_score};
pub use dates::{ParsedDate, parse_date};
pub use living::{
    PRIVATE_LIVING_PROBABILITY, estimate_living, estimate_living_at, estimate_profile,
};
