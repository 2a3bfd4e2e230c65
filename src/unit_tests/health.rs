// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::pod_healer::health::*;
use crate::unit_tests::common::*;
use proptest::prelude::*;

fn verdict(pod: &k8s_openapi::api::core::v1::Pod) -> Verdict {
    classify(pod, now(), &HealthThresholds::default())
}

#[test]
pub fn test_pending_past_threshold_is_stuck() {
    let pod = with_age(make_pod("default", "p", "Pending"), 16 * 60);
    assert_eq!(verdict(&pod), Verdict::StuckPending);
}

#[test]
pub fn test_pending_at_threshold_is_healthy() {
    let pod = with_age(make_pod("default", "p", "Pending"), 15 * 60);
    assert_eq!(verdict(&pod), Verdict::Healthy);
    let pod = with_age(make_pod("default", "p", "Pending"), 15 * 60 + 1);
    assert_eq!(verdict(&pod), Verdict::StuckPending);
}

#[test]
pub fn test_pending_without_creation_timestamp_is_healthy() {
    let mut pod = make_pod("default", "p", "Pending");
    pod.metadata.creation_timestamp = None;
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_creation_timestamp_in_the_future_counts_as_zero_age() {
    let pod = with_age(make_pod("default", "p", "Pending"), -3600);
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_restarts_past_threshold_is_crash_loop() {
    let pod = with_restarts(make_pod("default", "p", "Running"), 11);
    assert_eq!(verdict(&pod), Verdict::StuckCrashLoop);
    let pod = with_restarts(make_pod("default", "p", "Running"), 10);
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_any_container_can_trigger_crash_loop() {
    let pod = with_restarts(with_restarts(make_pod("default", "p", "Running"), 0), 42);
    assert_eq!(verdict(&pod), Verdict::StuckCrashLoop);
}

#[test]
pub fn test_crash_loop_back_off_reason_is_crash_loop() {
    let pod = with_waiting_reason(make_pod("default", "p", "Running"), "CrashLoopBackOff");
    assert_eq!(verdict(&pod), Verdict::StuckCrashLoop);
    let pod = with_waiting_reason(make_pod("default", "p", "Running"), "ContainerCreating");
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_crash_loop_only_applies_to_running_pods() {
    let pod = with_restarts(make_pod("default", "p", "Failed"), 50);
    assert_eq!(verdict(&pod), Verdict::Healthy);
    let pod = with_restarts(make_pod("default", "p", "Pending"), 50);
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_not_ready_past_threshold_is_stuck() {
    let pod = with_ready_condition(make_pod("default", "p", "Running"), "False", Some(ago(11 * 60)));
    assert_eq!(verdict(&pod), Verdict::StuckNotReady);
    let pod = with_ready_condition(make_pod("default", "p", "Running"), "False", Some(ago(10 * 60)));
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_not_ready_needs_a_ready_condition_with_transition_time() {
    let pod = make_pod("default", "p", "Running");
    assert_eq!(verdict(&pod), Verdict::Healthy);
    let pod = with_ready_condition(make_pod("default", "p", "Running"), "False", None);
    assert_eq!(verdict(&pod), Verdict::Healthy);
    let pod = with_ready_condition(make_pod("default", "p", "Running"), "Unknown", Some(ago(3600)));
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_ready_pod_is_healthy() {
    let pod = with_ready_condition(make_pod("default", "p", "Running"), "True", Some(ago(3600)));
    assert!(is_pod_ready(&pod));
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_first_matching_rule_wins() {
    let pod = with_ready_condition(
        with_age(make_pod("default", "p", "Pending"), 3600),
        "False",
        Some(ago(3600)),
    );
    assert_eq!(verdict(&pod), Verdict::StuckPending);
    let pod = with_ready_condition(with_restarts(make_pod("default", "p", "Running"), 20), "False", Some(ago(3600)));
    assert_eq!(verdict(&pod), Verdict::StuckCrashLoop);
}

#[test]
pub fn test_unrecognised_phase_is_unknown() {
    assert_eq!(PodPhase::of(&make_pod("default", "p", "Evicted")), PodPhase::Unknown);
    assert_eq!(PodPhase::of(&make_pod("default", "p", "Succeeded")), PodPhase::Succeeded);
    let mut pod = make_pod("default", "p", "Running");
    pod.status = None;
    assert_eq!(PodPhase::of(&pod), PodPhase::Unknown);
    assert_eq!(verdict(&pod), Verdict::Healthy);
}

#[test]
pub fn test_custom_thresholds() {
    let thresholds = HealthThresholds {
        pending: std::time::Duration::from_secs(60),
        restarts: 2,
        not_ready: std::time::Duration::from_secs(60),
    };
    let pod = with_age(make_pod("default", "p", "Pending"), 61);
    assert_eq!(classify(&pod, now(), &thresholds), Verdict::StuckPending);
    let pod = with_restarts(make_pod("default", "p", "Running"), 3);
    assert_eq!(classify(&pod, now(), &thresholds), Verdict::StuckCrashLoop);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]
    #[test]
    fn test_pending_verdict_is_strictly_past_threshold(age in 0i64..7200) {
        let pod = with_age(make_pod("default", "p", "Pending"), age);
        let expected = if age > 15 * 60 { Verdict::StuckPending } else { Verdict::Healthy };
        prop_assert_eq!(verdict(&pod), expected);
    }

    #[test]
    fn test_crash_loop_is_monotonic_in_restarts(low in 0i32..100, extra in 0i32..100) {
        let before = verdict(&with_restarts(make_pod("default", "p", "Running"), low));
        let after = verdict(&with_restarts(make_pod("default", "p", "Running"), low + extra));
        prop_assert_eq!(before == Verdict::StuckCrashLoop, low > 10);
        if before == Verdict::StuckCrashLoop {
            prop_assert_eq!(after, Verdict::StuckCrashLoop);
        }
    }
}
