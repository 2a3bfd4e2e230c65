// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::crds::{NginxDeployment, NginxDeploymentStatus};
use k8s_openapi::api::apps::v1::Deployment;

pub fn status_message(available_replicas: i32, replicas: i32) -> String {
    if available_replicas == replicas {
        "Ready".to_string()
    } else {
        format!("Available: {}/{}", available_replicas, replicas)
    }
}

pub fn make_status(nd: &NginxDeployment, deployment: &Deployment) -> NginxDeploymentStatus {
    let available_replicas = deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .unwrap_or(0);
    NginxDeploymentStatus {
        available_replicas,
        status: Some(status_message(available_replicas, nd.spec.replicas)),
    }
}

/// Whether writing `status` would change what the parent already reports.
pub fn status_changed(nd: &NginxDeployment, status: &NginxDeploymentStatus) -> bool {
    nd.status.as_ref() != Some(status)
}
