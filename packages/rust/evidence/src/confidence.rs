//! Weighted evidence scoring for descendant records.
//!
//! Weights and tier thresholds are kept in whole hundredths so that scores
//! land exactly on the tier boundaries instead of drifting under them.

use lineage_shared::{ConfidenceFactors, LineageStatus, Profile};

/// A source-site profile exists at all.
const SOURCE_PROFILE_POINTS: u32 = 30;
/// Birth year is known.
const BIRTH_YEAR_POINTS: u32 = 20;
/// Death year is known, or the living estimate is resolved.
const DEATH_OR_LIVING_POINTS: u32 = 20;
/// A birth or death place is recorded.
const PLACE_POINTS: u32 = 15;
/// At least one child is linked.
const CHILDREN_POINTS: u32 = 15;

const MAX_POINTS: u32 = 100;
const CONFIRMED_THRESHOLD: u32 = 85;
const PROBABLE_THRESHOLD: u32 = 60;

/// Score and per-signal breakdown for one profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceAssessment {
    /// Aggregate score in `[0, 1]`.
    pub score: f64,
    pub factors: ConfidenceFactors,
    pub status: LineageStatus,
}

/// Score a profile's trustworthiness as a descendant record.
pub fn score(profile: &Profile) -> ConfidenceAssessment {
    let source_profile = SOURCE_PROFILE_POINTS;
    let birth_year = signal(profile.birth_year.is_some(), BIRTH_YEAR_POINTS);
    let death_or_living = signal(
        profile.death_year.is_some() || profile.living.is_resolved(),
        DEATH_OR_LIVING_POINTS,
    );
    let place = signal(profile.has_place(), PLACE_POINTS);
    let children = signal(!profile.children.is_empty(), CHILDREN_POINTS);

    let points = (source_profile + birth_year + death_or_living + place + children).min(MAX_POINTS);

    ConfidenceAssessment {
        score: to_score(points),
        factors: ConfidenceFactors {
            source_profile: to_score(source_profile),
            birth_year: to_score(birth_year),
            death_or_living: to_score(death_or_living),
            place: to_score(place),
            children: to_score(children),
        },
        status: status_for_points(points),
    }
}

/// Tier for an arbitrary score in `[0, 1]`.
pub fn status_for_score(score: f64) -> LineageStatus {
    status_for_points((score.clamp(0.0, 1.0) * 100.0).round() as u32)
}

fn status_for_points(points: u32) -> LineageStatus {
    if points >= CONFIRMED_THRESHOLD {
        LineageStatus::ConfirmedLineage
    } else if points >= PROBABLE_THRESHOLD {
        LineageStatus::Probable
    } else {
        LineageStatus::Suspected
    }
}

fn signal(present: bool, points: u32) -> u32 {
    if present { points } else { 0 }
}

fn to_score(points: u32) -> f64 {
    f64::from(points) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_shared::{ChildRef, LivingEstimate};

    fn bare_profile() -> Profile {
        Profile::new("Hopewell-200", "Samuel Hopewell")
    }

    #[test]
    fn bare_profile_is_suspected() {
        let result = score(&bare_profile());
        assert_eq!(result.score, 0.30);
        assert_eq!(result.status, LineageStatus::Suspected);
        assert_eq!(result.factors.source_profile, 0.30);
        assert_eq!(result.factors.birth_year, 0.0);
    }

    #[test]
    fn full_evidence_is_confirmed_and_capped() {
        let mut profile = bare_profile();
        profile.birth_year = Some(1817);
        profile.death_year = Some(1880);
        profile.birth_place = Some("Virginia".into());
        profile.children.push(ChildRef {
            external_id: "Hopewell-201".into(),
            display_name: "Ruth Hopewell".into(),
        });

        let result = score(&profile);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.status, LineageStatus::ConfirmedLineage);
        assert!((result.factors.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_as_signals_are_added() {
        let mut profile = bare_profile();
        let mut last = score(&profile).score;

        let steps: Vec<Box<dyn Fn(&mut Profile)>> = vec![
            Box::new(|p: &mut Profile| p.birth_year = Some(1817)),
            Box::new(|p: &mut Profile| p.death_year = Some(1880)),
            Box::new(|p: &mut Profile| p.death_place = Some("Ohio".into())),
            Box::new(|p: &mut Profile| {
                p.children.push(ChildRef {
                    external_id: "Hopewell-202".into(),
                    display_name: "Eli Hopewell".into(),
                })
            }),
            Box::new(|p: &mut Profile| p.birth_place = Some("Virginia".into())),
        ];

        for step in steps {
            step(&mut profile);
            let next = score(&profile).score;
            assert!(next >= last, "score dropped from {last} to {next}");
            assert!((0.0..=1.0).contains(&next));
            last = next;
        }
    }

    #[test]
    fn resolved_living_estimate_substitutes_for_death_year() {
        let mut profile = bare_profile();
        profile.birth_year = Some(1990);
        profile.living = LivingEstimate::with_probability(0.95);

        let result = score(&profile);
        assert_eq!(result.factors.death_or_living, 0.20);
        assert_eq!(result.score, 0.70);
        assert_eq!(result.status, LineageStatus::Probable);
    }

    #[test]
    fn exact_threshold_scores() {
        // 0.30 + 0.20 + 0.20 + 0.15 = 0.85
        let mut profile = bare_profile();
        profile.birth_year = Some(1817);
        profile.death_year = Some(1880);
        profile.birth_place = Some("Virginia".into());
        let result = score(&profile);
        assert_eq!(result.score, 0.85);
        assert_eq!(result.status, LineageStatus::ConfirmedLineage);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(status_for_score(0.85), LineageStatus::ConfirmedLineage);
        assert_eq!(status_for_score(0.84), LineageStatus::Probable);
        assert_eq!(status_for_score(0.60), LineageStatus::Probable);
        assert_eq!(status_for_score(0.59), LineageStatus::Suspected);
        assert_eq!(status_for_score(0.0), LineageStatus::Suspected);
    }
}
