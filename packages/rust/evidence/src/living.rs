//! Living-status estimation from birth and death years.
//!
//! The tiers decide whether a descendant may still be alive and therefore
//! needs privacy handling. Boundaries are inclusive on the upper end of each
//! age band.

use chrono::{Datelike, Utc};
use lineage_shared::{LivingEstimate, Profile};

/// Probability assigned to private profiles with no usable dates.
pub const PRIVATE_LIVING_PROBABILITY: f64 = 0.9;

/// Estimate living status relative to the current calendar year.
pub fn estimate_living(birth_year: Option<i32>, death_year: Option<i32>) -> LivingEstimate {
    estimate_living_at(birth_year, death_year, Utc::now().year())
}

/// Estimate living status as of `current_year`.
pub fn estimate_living_at(
    birth_year: Option<i32>,
    death_year: Option<i32>,
    current_year: i32,
) -> LivingEstimate {
    if death_year.is_some() {
        return LivingEstimate::with_probability(0.0);
    }
    let Some(birth) = birth_year else {
        return LivingEstimate::unknown();
    };

    let age = current_year - birth;
    let probability = if age > 120 {
        0.0
    } else if age > 90 {
        0.1
    } else if age > 70 {
        0.5
    } else if age > 50 {
        0.85
    } else {
        0.95
    };

    LivingEstimate::with_probability(probability)
}

/// Living estimate for a parsed profile.
///
/// Dates decide when present. A private page without usable dates is
/// treated as living, since the source site hides living people by default.
pub fn estimate_profile(profile: &Profile) -> LivingEstimate {
    let estimate = estimate_living(profile.birth_year, profile.death_year);
    if !estimate.is_resolved() && profile.is_private {
        return LivingEstimate::with_probability(PRIVATE_LIVING_PROBABILITY);
    }
    estimate
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i32 = 2026;

    fn probability_at_age(age: i32) -> f64 {
        estimate_living_at(Some(NOW - age), None, NOW)
            .probability
            .expect("resolved estimate")
    }

    #[test]
    fn death_year_means_not_living() {
        let estimate = estimate_living_at(Some(1990), Some(2020), NOW);
        assert_eq!(estimate.is_living, Some(false));
        assert_eq!(estimate.probability, Some(0.0));
    }

    #[test]
    fn missing_birth_year_is_unknown() {
        let estimate = estimate_living_at(None, None, NOW);
        assert_eq!(estimate, LivingEstimate::unknown());
    }

    #[test]
    fn recent_birth_is_living() {
        let estimate = estimate_living(Some(1990), None);
        assert_eq!(estimate.is_living, Some(true));
        assert!(estimate.probability.unwrap() >= 0.9);
    }

    #[test]
    fn nineteenth_century_birth_is_not_living() {
        let estimate = estimate_living(Some(1850), None);
        assert_eq!(estimate.is_living, Some(false));
        assert_eq!(estimate.probability, Some(0.0));
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(probability_at_age(121), 0.0);
        assert_eq!(probability_at_age(120), 0.1);
        assert_eq!(probability_at_age(91), 0.1);
        assert_eq!(probability_at_age(90), 0.5);
        assert_eq!(probability_at_age(71), 0.5);
        assert_eq!(probability_at_age(70), 0.85);
        assert_eq!(probability_at_age(51), 0.85);
        assert_eq!(probability_at_age(50), 0.95);
        assert_eq!(probability_at_age(0), 0.95);
    }

    #[test]
    fn any_positive_probability_counts_as_living() {
        let estimate = estimate_living_at(Some(NOW - 100), None, NOW);
        assert_eq!(estimate.is_living, Some(true));
    }

    #[test]
    fn private_profile_without_dates_is_living() {
        let mut profile = Profile::new("Private-1", "Private");
        profile.is_private = true;
        let estimate = estimate_profile(&profile);
        assert_eq!(estimate.is_living, Some(true));
        assert_eq!(estimate.probability, Some(PRIVATE_LIVING_PROBABILITY));
    }

    #[test]
    fn dates_override_privacy_marker() {
        let mut profile = Profile::new("Private-2", "Private");
        profile.is_private = true;
        profile.death_year = Some(1901);
        assert_eq!(estimate_profile(&profile).is_living, Some(false));
    }
}
