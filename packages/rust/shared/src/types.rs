//! Core domain types for descendant lineage crawls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label stored in `discovered_via` for records found by the profile crawler.
pub const DISCOVERED_VIA_CRAWLER: &str = "profile_crawler";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for crawl run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A link from a profile page to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    /// External identifier of the child's profile.
    pub external_id: String,
    /// Name as shown in the link text.
    pub display_name: String,
}

/// Probabilistic judgment of whether a person is alive.
///
/// Both fields are `None` when there is not enough evidence to decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LivingEstimate {
    pub is_living: Option<bool>,
    pub probability: Option<f64>,
}

impl LivingEstimate {
    /// No evidence either way.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Estimate with a known probability; living whenever `probability > 0`.
    pub fn with_probability(probability: f64) -> Self {
        Self {
            is_living: Some(probability > 0.0),
            probability: Some(probability),
        }
    }

    /// Whether a judgment was reached.
    pub fn is_resolved(&self) -> bool {
        self.is_living.is_some()
    }
}

/// One parsed profile from the source genealogy site.
///
/// Ephemeral: profiles are cached for the duration of a single run only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identifier assigned by the source site (e.g. `Hopewell-183`).
    pub external_id: String,
    pub display_name: String,
    pub birth_year: Option<i32>,
    pub birth_approximate: bool,
    pub death_year: Option<i32>,
    pub death_approximate: bool,
    pub birth_place: Option<String>,
    pub death_place: Option<String>,
    /// The page carries an explicit privacy marker.
    pub is_private: bool,
    /// Derived from the dates and privacy flag when the profile is parsed.
    pub living: LivingEstimate,
    pub children: Vec<ChildRef>,
}

impl Profile {
    /// A profile with only an identifier and a name.
    pub fn new(external_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: display_name.into(),
            birth_year: None,
            birth_approximate: false,
            death_year: None,
            death_approximate: false,
            birth_place: None,
            death_place: None,
            is_private: false,
            living: LivingEstimate::unknown(),
            children: Vec::new(),
        }
    }

    /// Whether the estimate judged the person alive; unknown counts as not living.
    pub fn is_living(&self) -> bool {
        self.living.is_living.unwrap_or(false)
    }

    /// Whether either a birth or a death place is recorded.
    pub fn has_place(&self) -> bool {
        self.birth_place.is_some() || self.death_place.is_some()
    }
}

// ---------------------------------------------------------------------------
// Owner
// ---------------------------------------------------------------------------

/// The root ancestor a set of descendant records belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    /// External identifier of the root profile.
    pub external_id: String,
    /// Name the platform knows the owner by; queries are keyed on this.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Trust tier derived from a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageStatus {
    Suspected,
    Probable,
    ConfirmedLineage,
}

impl LineageStatus {
    /// All tiers, lowest first.
    pub const ALL: [LineageStatus; 3] = [
        LineageStatus::Suspected,
        LineageStatus::Probable,
        LineageStatus::ConfirmedLineage,
    ];

    /// Storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Suspected => "suspected",
            Self::Probable => "probable",
            Self::ConfirmedLineage => "confirmed_lineage",
        }
    }
}

impl std::fmt::Display for LineageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LineageStatus {
    type Err = crate::LineageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "suspected" => Ok(Self::Suspected),
            "probable" => Ok(Self::Probable),
            "confirmed_lineage" => Ok(Self::ConfirmedLineage),
            other => Err(crate::LineageError::validation(format!(
                "unknown lineage status '{other}'"
            ))),
        }
    }
}

/// Per-signal contribution to a confidence score.
///
/// Each field holds the weight the signal contributed, or `0.0` when the
/// signal was absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub source_profile: f64,
    pub birth_year: f64,
    pub death_or_living: f64,
    pub place: f64,
    pub children: f64,
}

impl ConfidenceFactors {
    /// Sum of all contributions (uncapped).
    pub fn total(&self) -> f64 {
        self.source_profile + self.birth_year + self.death_or_living + self.place + self.children
    }
}

// ---------------------------------------------------------------------------
// DescendantRecord
// ---------------------------------------------------------------------------

/// A persisted descendant of an owner, with a back-pointer to its parent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescendantRecord {
    /// Record identifier (UUID v7).
    pub id: String,
    /// Crawl run that discovered this record.
    pub run_id: String,
    pub owner_external_id: String,
    pub owner_name: String,
    pub descendant_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub death_year: Option<i32>,
    /// Distance from the owner; the owner's children are generation 1.
    pub generation: u32,
    /// `child`, `grandchild`, `great-grandchild`, ...
    pub relationship_path: String,
    /// `None` exactly when `generation == 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_descendant_id: Option<String>,
    pub source_external_id: String,
    pub confidence_score: f64,
    pub confidence_factors: ConfidenceFactors,
    pub status: LineageStatus,
    pub is_living: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub living_probability: Option<f64>,
    pub discovered_via: String,
    pub discovery_date: DateTime<Utc>,
}

/// Relationship label for a generation (1 = child, 2 = grandchild, ...).
pub fn relationship_label(generation: u32) -> String {
    match generation {
        0 => "self".to_string(),
        1 => "child".to_string(),
        2 => "grandchild".to_string(),
        n => format!("{}grandchild", "great-".repeat((n - 2) as usize)),
    }
}
