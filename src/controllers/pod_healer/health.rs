// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;

pub const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Thresholds past which a pod counts as stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    pub pending: Duration,
    pub restarts: i32,
    pub not_ready: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        HealthThresholds {
            pending: Duration::from_secs(15 * 60),
            restarts: 10,
            not_ready: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Healthy,
    StuckPending,
    StuckCrashLoop,
    StuckNotReady,
}

impl Verdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Verdict::Healthy)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Healthy => "Healthy",
            Verdict::StuckPending => "StuckPending",
            Verdict::StuckCrashLoop => "StuckCrashLoop",
            Verdict::StuckNotReady => "StuckNotReady",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn of(pod: &Pod) -> PodPhase {
        let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

// Time elapsed from `since` to `now`; a timestamp in the future counts as no time at all.
fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

fn pod_age(pod: &Pod, now: DateTime<Utc>) -> Duration {
    pod.metadata
        .creation_timestamp
        .as_ref()
        .map(|created| elapsed(now, created.0))
        .unwrap_or(Duration::ZERO)
}

fn is_stuck_pending(pod: &Pod, now: DateTime<Utc>, thresholds: &HealthThresholds) -> bool {
    PodPhase::of(pod) == PodPhase::Pending && pod_age(pod, now) > thresholds.pending
}

fn is_crash_looping(pod: &Pod, thresholds: &HealthThresholds) -> bool {
    if PodPhase::of(pod) != PodPhase::Running {
        return false;
    }
    let container_statuses = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref());
    container_statuses.into_iter().flatten().any(|container_status| {
        let waiting_reason = container_status
            .state
            .as_ref()
            .and_then(|state| state.waiting.as_ref())
            .and_then(|waiting| waiting.reason.as_deref());
        container_status.restart_count > thresholds.restarts || waiting_reason == Some(CRASH_LOOP_BACK_OFF)
    })
}

/// A pod is ready iff it carries a Ready condition with status True.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True")
}

// Only a Ready=False condition with a transition time can make a pod stuck not-ready;
// pods that have not reported a Ready condition yet are left alone.
fn is_stuck_not_ready(pod: &Pod, now: DateTime<Utc>, thresholds: &HealthThresholds) -> bool {
    if is_pod_ready(pod) {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .filter(|condition| condition.type_ == "Ready" && condition.status == "False")
        .filter_map(|condition| condition.last_transition_time.as_ref())
        .any(|transitioned| elapsed(now, transitioned.0) > thresholds.not_ready)
}

/// classify derives the verdict for a pod from its snapshot alone.
/// Rules are checked in priority order and the first match wins.
pub fn classify(pod: &Pod, now: DateTime<Utc>, thresholds: &HealthThresholds) -> Verdict {
    if is_stuck_pending(pod, now, thresholds) {
        Verdict::StuckPending
    } else if is_crash_looping(pod, thresholds) {
        Verdict::StuckCrashLoop
    } else if is_stuck_not_ready(pod, now, thresholds) {
        Verdict::StuckNotReady
    } else {
        Verdict::Healthy
    }
}
