//! Repository-size tiers and their default threshold suggestions.
//!
//! A recommendation is only a default: it applies when a repository has no
//! explicit threshold and never overwrites one.

use serde::Serialize;

use flakeguard_state::{GlobalSettings, RepoSizeThresholds};

/// Size bucket of a repository, by test count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Small,
    Medium,
    Large,
}

impl SizeTier {
    /// `small` below the small boundary, `medium` below the medium boundary,
    /// `large` otherwise.
    pub fn for_test_count(test_count: u32, bounds: &RepoSizeThresholds) -> Self {
        if test_count < bounds.small {
            SizeTier::Small
        } else if test_count < bounds.medium {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeTier::Small => "small",
            SizeTier::Medium => "medium",
            SizeTier::Large => "large",
        }
    }
}

/// Suggested thresholds for a repository of a given size.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRecommendation {
    pub tier: SizeTier,
    pub flake_threshold: f64,
    pub failure_threshold: f64,
    pub description: String,
}

/// Look up the recommendation for `test_count`.
pub fn recommend(test_count: u32, settings: &GlobalSettings) -> TierRecommendation {
    let tier = SizeTier::for_test_count(test_count, &settings.repo_size_thresholds);
    let (flake, failure) = match tier {
        SizeTier::Small => (
            &settings.flake_recommendations.small,
            &settings.failure_recommendations.small,
        ),
        SizeTier::Medium => (
            &settings.flake_recommendations.medium,
            &settings.failure_recommendations.medium,
        ),
        SizeTier::Large => (
            &settings.flake_recommendations.large,
            &settings.failure_recommendations.large,
        ),
    };

    TierRecommendation {
        tier,
        flake_threshold: flake.threshold,
        failure_threshold: failure.threshold,
        description: flake.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_are_exclusive_upper_bounds() {
        let bounds = RepoSizeThresholds {
            small: 100,
            medium: 500,
        };
        assert_eq!(SizeTier::for_test_count(0, &bounds), SizeTier::Small);
        assert_eq!(SizeTier::for_test_count(99, &bounds), SizeTier::Small);
        assert_eq!(SizeTier::for_test_count(100, &bounds), SizeTier::Medium);
        assert_eq!(SizeTier::for_test_count(499, &bounds), SizeTier::Medium);
        assert_eq!(SizeTier::for_test_count(500, &bounds), SizeTier::Large);
    }

    #[test]
    fn recommendation_uses_tier_values() {
        let settings = GlobalSettings::default();
        let rec = recommend(250, &settings);
        assert_eq!(rec.tier, SizeTier::Medium);
        assert_eq!(rec.flake_threshold, 10.0);
        assert_eq!(rec.failure_threshold, 15.0);
        assert!(!rec.description.is_empty());

        let rec = recommend(10_000, &settings);
        assert_eq!(rec.tier, SizeTier::Large);
        assert_eq!(rec.flake_threshold, 15.0);
    }
}
