//! Report aggregation.
//!
//! A pure fold from test outcomes to a [`ConformanceReport`]. Outcomes are
//! sorted by name before anything else happens and every emitted list is
//! sorted, so the report depends only on the multiset of outcomes and the
//! caller-supplied header.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use conformance_types::{
    ConformanceReport, CoreResult, ExtendedResult, Feature, Implementation, Profile, ProfileName,
    ProfileRegistry, ProfileReport, ProfileStatus, Statistics, TestOutcome, TestStatus,
    GATEWAY_API_VERSION, REPORT_API_VERSION, REPORT_KIND,
};

use crate::resolver::SupportedFeatureSet;

/// Run-level fields copied into the report unchanged.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub date: DateTime<Utc>,
    pub gateway_class: String,
    pub implementation: Option<Implementation>,
    pub aborted: Option<String>,
}

/// Fold outcomes into a report.
///
/// With an empty `requested` set the report carries a flat summary and no
/// profile entries.
pub fn aggregate(
    outcomes: &[TestOutcome],
    registry: &ProfileRegistry,
    requested: &BTreeSet<ProfileName>,
    supported: &SupportedFeatureSet,
    header: ReportHeader,
) -> ConformanceReport {
    let mut sorted: Vec<&TestOutcome> = outcomes.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let skipped_tests: Vec<String> = sorted
        .iter()
        .filter(|o| o.is_skipped())
        .map(|o| o.name.clone())
        .collect();

    let (profiles, summary) = if requested.is_empty() {
        let mut statistics = Statistics::default();
        for outcome in &sorted {
            statistics.record(outcome.status);
        }
        (Vec::new(), Some(statistics))
    } else {
        let profiles = requested
            .iter()
            .filter_map(|name| registry.get(*name))
            .map(|profile| score_profile(profile, &sorted, supported))
            .collect();
        (profiles, None)
    };

    ConformanceReport {
        api_version: REPORT_API_VERSION.to_string(),
        kind: REPORT_KIND.to_string(),
        date: header.date,
        gateway_api_version: GATEWAY_API_VERSION.to_string(),
        gateway_class: header.gateway_class,
        implementation: header.implementation,
        profiles,
        summary,
        skipped_tests,
        aborted: header.aborted,
    }
}

fn score_profile(
    profile: &Profile,
    outcomes: &[&TestOutcome],
    supported: &SupportedFeatureSet,
) -> ProfileReport {
    let mut core = CoreResult::default();
    let mut extended = ExtendedResult::default();
    // Extended feature -> did every associated test pass.
    let mut feature_results: BTreeMap<Feature, bool> = BTreeMap::new();

    for outcome in outcomes.iter().filter(|o| profile.includes_test(&o.features)) {
        let passed = outcome.status == TestStatus::Passed;

        if profile.is_core_test(&outcome.features) {
            core.statistics.record(outcome.status);
            push_name(&mut core.failed_tests, &mut core.skipped_tests, outcome);
        } else {
            extended.statistics.record(outcome.status);
            push_name(&mut extended.failed_tests, &mut extended.skipped_tests, outcome);
        }

        for feature in outcome.features.iter().filter(|f| profile.extended.contains(*f)) {
            let entry = feature_results.entry(*feature).or_insert(true);
            *entry &= passed;
        }
    }

    for feature in &profile.extended {
        if feature_results.get(feature).copied().unwrap_or(false) {
            extended.supported_features.push(*feature);
        } else {
            extended.unsupported_features.push(*feature);
        }
    }

    let supported_core = profile.core.iter().filter(|f| supported.contains(**f)).count();
    let below_threshold = supported_core < profile.min_core_features;

    let status = if below_threshold || !core.statistics.all_passed() {
        ProfileStatus::Failure
    } else if extended.statistics.all_passed() {
        ProfileStatus::Success
    } else {
        ProfileStatus::Partial
    };

    let summary = if below_threshold {
        format!(
            "only {} of {} required core features supported",
            supported_core, profile.min_core_features
        )
    } else {
        format!(
            "core tests: {} passed, {} failed, {} skipped; \
             extended tests: {} passed, {} failed, {} skipped",
            core.statistics.passed,
            core.statistics.failed,
            core.statistics.skipped,
            extended.statistics.passed,
            extended.statistics.failed,
            extended.statistics.skipped
        )
    };

    ProfileReport {
        name: profile.name,
        status,
        core,
        extended,
        summary,
    }
}

fn push_name(failed: &mut Vec<String>, skipped: &mut Vec<String>, outcome: &TestOutcome) {
    match outcome.status {
        TestStatus::Passed => {}
        TestStatus::Failed => failed.push(outcome.name.clone()),
        TestStatus::Skipped => skipped.push(outcome.name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::time::Duration;

    fn header() -> ReportHeader {
        ReportHeader {
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            gateway_class: "acme".into(),
            implementation: None,
            aborted: None,
        }
    }

    fn outcome(name: &str, features: &[Feature], status: TestStatus) -> TestOutcome {
        match status {
            TestStatus::Passed => TestOutcome::passed(name, features.to_vec(), 1, Duration::ZERO),
            TestStatus::Failed => {
                TestOutcome::failed(name, features.to_vec(), "boom", 1, Duration::ZERO)
            }
            TestStatus::Skipped => TestOutcome::skipped(name, features.to_vec(), "missing"),
        }
    }

    /// Core {Gateway, HTTPRoute}, extended {HTTPRouteQueryParamMatching}.
    fn registry() -> ProfileRegistry {
        ProfileRegistry::new(vec![Profile::new(
            ProfileName::Http,
            [Feature::Gateway, Feature::HttpRoute],
            [Feature::HttpRouteQueryParamMatching],
        )])
    }

    fn all_supported() -> SupportedFeatureSet {
        Feature::ALL.iter().copied().collect()
    }

    fn http() -> BTreeSet<ProfileName> {
        BTreeSet::from([ProfileName::Http])
    }

    #[test]
    fn test_extended_failure_is_partial() {
        let outcomes = vec![
            outcome("A", &[Feature::Gateway], TestStatus::Passed),
            outcome("B", &[Feature::HttpRoute], TestStatus::Passed),
            outcome(
                "C",
                &[Feature::HttpRoute, Feature::HttpRouteQueryParamMatching],
                TestStatus::Failed,
            ),
        ];
        let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.status, ProfileStatus::Partial);
        assert_eq!(profile.core.statistics.passed, 2);
        assert_eq!(profile.extended.failed_tests, vec!["C"]);
        assert!(profile.extended.supported_features.is_empty());
        assert_eq!(
            profile.extended.unsupported_features,
            vec![Feature::HttpRouteQueryParamMatching]
        );
        assert!(report.summary.is_none());
    }

    #[test]
    fn test_core_skip_is_failure() {
        let outcomes = vec![
            outcome("A", &[Feature::Gateway], TestStatus::Skipped),
            outcome("B", &[Feature::HttpRoute], TestStatus::Passed),
        ];
        let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.status, ProfileStatus::Failure);
        assert_eq!(profile.core.skipped_tests, vec!["A"]);
        assert_eq!(report.skipped_tests, vec!["A"]);
    }

    #[test]
    fn test_all_pass_is_success() {
        let outcomes = vec![
            outcome("A", &[Feature::Gateway], TestStatus::Passed),
            outcome(
                "C",
                &[Feature::HttpRoute, Feature::HttpRouteQueryParamMatching],
                TestStatus::Passed,
            ),
        ];
        let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.status, ProfileStatus::Success);
        assert_eq!(
            profile.extended.supported_features,
            vec![Feature::HttpRouteQueryParamMatching]
        );
    }

    #[test]
    fn test_extended_feature_without_tests_is_unsupported() {
        let outcomes = vec![outcome("A", &[Feature::Gateway], TestStatus::Passed)];
        let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.status, ProfileStatus::Success);
        assert_eq!(
            profile.extended.unsupported_features,
            vec![Feature::HttpRouteQueryParamMatching]
        );
    }

    #[test]
    fn test_core_threshold() {
        let outcomes = vec![outcome("A", &[Feature::Gateway], TestStatus::Passed)];
        let supported: SupportedFeatureSet = [Feature::Gateway].into_iter().collect();
        let report = aggregate(&outcomes, &registry(), &http(), &supported, header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.status, ProfileStatus::Failure);
        assert_eq!(profile.summary, "only 1 of 2 required core features supported");
    }

    #[test]
    fn test_legacy_mode_flat_summary() {
        let outcomes = vec![
            outcome("A", &[], TestStatus::Passed),
            outcome("B", &[Feature::HttpRoute], TestStatus::Failed),
            outcome("C", &[Feature::Mesh], TestStatus::Skipped),
        ];
        let report =
            aggregate(&outcomes, &registry(), &BTreeSet::new(), &all_supported(), header());

        assert!(report.profiles.is_empty());
        let summary = report.summary.unwrap();
        assert_eq!((summary.passed, summary.failed, summary.skipped), (1, 1, 1));
        assert_eq!(summary.total(), outcomes.len());
        assert_eq!(report.skipped_tests, vec!["C"]);
    }

    #[test]
    fn test_featureless_tests_are_not_scored() {
        let outcomes = vec![
            outcome("Basics", &[], TestStatus::Failed),
            outcome("A", &[Feature::Gateway], TestStatus::Passed),
        ];
        let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
        let profile = report.profile(ProfileName::Http).unwrap();

        assert_eq!(profile.core.statistics.total(), 1);
        assert_eq!(profile.extended.statistics.total(), 0);
    }

    fn arb_status() -> impl Strategy<Value = TestStatus> {
        prop_oneof![
            Just(TestStatus::Passed),
            Just(TestStatus::Failed),
            Just(TestStatus::Skipped),
        ]
    }

    fn arb_outcomes() -> impl Strategy<Value = Vec<TestOutcome>> {
        let features = proptest::sample::subsequence(
            vec![
                Feature::Gateway,
                Feature::HttpRoute,
                Feature::HttpRouteQueryParamMatching,
                Feature::Mesh,
            ],
            0..=3,
        );
        proptest::collection::vec((features, arb_status()), 0..12).prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (features, status))| outcome(&format!("Test{:02}", i), &features, status))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_permutation_invariant(outcomes in arb_outcomes(), seed in any::<u64>()) {
            let mut shuffled = outcomes.clone();
            // Deterministic rotation and reversal stand in for a shuffle.
            if !shuffled.is_empty() {
                let by = (seed as usize) % shuffled.len();
                shuffled.rotate_left(by);
            }
            if seed % 2 == 0 {
                shuffled.reverse();
            }

            let first = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
            let second = aggregate(&shuffled, &registry(), &http(), &all_supported(), header());
            prop_assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
        }

        #[test]
        fn prop_legacy_counts_cover_every_outcome(outcomes in arb_outcomes()) {
            let report =
                aggregate(&outcomes, &registry(), &BTreeSet::new(), &all_supported(), header());
            prop_assert_eq!(report.summary.unwrap().total(), outcomes.len());
        }

        #[test]
        fn prop_success_implies_no_core_failures(outcomes in arb_outcomes()) {
            let report = aggregate(&outcomes, &registry(), &http(), &all_supported(), header());
            let profile = report.profile(ProfileName::Http).unwrap();
            if profile.status != ProfileStatus::Failure {
                prop_assert_eq!(profile.core.statistics.failed, 0);
                prop_assert_eq!(profile.core.statistics.skipped, 0);
            }
        }
    }
}
