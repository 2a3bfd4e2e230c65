// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::pod_healer::health::Verdict;
use crate::error::Error;
use crate::kubernetes_api_objects::{
    api_method::{KubeAPIRequest, KubeAPIResponse, KubeDeleteRequest, KubeDeleteResponse},
    error::APIError,
};
use crate::shim_layer::api_server::ApiServer;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, warn};

pub const IGNORE_ANNOTATION: &str = "healing/ignore";
pub const ACTION_ANNOTATION: &str = "healing/action";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealingAction {
    Delete,
    CustomRestart,
    CustomDelete,
    Skip,
}

/// What the executor ended up doing for one pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealOutcome {
    Skipped,
    Deleted,
    AlreadyGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationPolicy {
    pub excluded_namespaces: Vec<String>,
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        RemediationPolicy {
            excluded_namespaces: vec!["kube-system".to_string()],
        }
    }
}

impl RemediationPolicy {
    /// Pods in an excluded namespace or carrying the ignore annotation are never evaluated.
    pub fn should_evaluate(&self, pod: &Pod) -> bool {
        let namespace = pod.namespace().unwrap_or_default();
        !self.excluded_namespaces.iter().any(|excluded| excluded == &namespace)
            && !pod.annotations().contains_key(IGNORE_ANNOTATION)
    }
}

pub fn decide(pod: &Pod, verdict: Verdict) -> HealingAction {
    if verdict.is_healthy() {
        return HealingAction::Skip;
    }
    let annotations = pod.annotations();
    if annotations.contains_key(IGNORE_ANNOTATION) {
        return HealingAction::Skip;
    }
    match annotations.get(ACTION_ANNOTATION).map(String::as_str) {
        Some("restart") => HealingAction::CustomRestart,
        Some("delete") => HealingAction::CustomDelete,
        Some("ignore") => HealingAction::Skip,
        _ => HealingAction::Delete,
    }
}

/// Carries out the action on the pod. Every corrective action boils down to deleting
/// the pod so its owning workload recreates it; a pod that is already gone counts as healed.
pub async fn execute(api: &dyn ApiServer, pod: &Pod, action: HealingAction) -> Result<HealOutcome, Error> {
    let namespace = pod.namespace().unwrap_or_default();
    let name = pod.metadata.name.as_ref().ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let key = format!("Pod/{}/{}", namespace, name);
    match action {
        HealingAction::Skip => return Ok(HealOutcome::Skipped),
        HealingAction::Delete => info!("Healing {}: delete", key),
        HealingAction::CustomRestart => info!("Healing {}: custom restart, deleting the pod", key),
        HealingAction::CustomDelete => info!("Healing {}: custom delete", key),
    }
    let req = KubeAPIRequest::DeleteRequest(KubeDeleteRequest::of::<Pod>(&namespace, name));
    match api.handle(req).await {
        KubeAPIResponse::DeleteResponse(KubeDeleteResponse { res: Ok(()) }) => Ok(HealOutcome::Deleted),
        KubeAPIResponse::DeleteResponse(KubeDeleteResponse {
            res: Err(APIError::ObjectNotFound),
        }) => {
            info!("{} is already gone", key);
            Ok(HealOutcome::AlreadyGone)
        }
        KubeAPIResponse::DeleteResponse(KubeDeleteResponse { res: Err(err) }) => {
            warn!("Failed to delete {}: {}", key, err);
            Err(Error::HealPodFailed { key, source: err })
        }
        _ => Err(Error::ShimLayerError(format!("unexpected response to delete {}", key))),
    }
}
