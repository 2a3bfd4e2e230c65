// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: i32 = 80;
pub const DEFAULT_IMAGE: &str = "nginx:latest";

#[derive(CustomResource, Default, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(group = "web.example.com", version = "v1", kind = "NginxDeployment")]
#[kube(shortname = "nginxd", namespaced)]
#[kube(status = "NginxDeploymentStatus", derive = "PartialEq")]
#[kube(printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#)]
#[kube(printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableReplicas"}"#)]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
pub struct NginxDeploymentSpec {
    #[schemars(range(min = 0))]
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl NginxDeploymentSpec {
    /// The port to expose; unset (or zero) means the default.
    pub fn port(&self) -> i32 {
        match self.port {
            Some(port) if port != 0 => port,
            _ => DEFAULT_PORT,
        }
    }

    /// The image to run; unset (or empty) means the default.
    pub fn image(&self) -> &str {
        match self.image.as_deref() {
            Some(image) if !image.is_empty() => image,
            _ => DEFAULT_IMAGE,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NginxDeploymentStatus {
    #[serde(rename = "availableReplicas", default)]
    pub available_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}
