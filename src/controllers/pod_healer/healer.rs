// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::pod_healer::{
    health::{classify, HealthThresholds},
    remediation::{decide, execute, HealOutcome, RemediationPolicy},
};
use crate::error::Error;
use crate::shim_layer::api_server::ApiServer;
use crate::shim_layer::watch_cache::WatchEvent;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HealerConfig {
    pub thresholds: HealthThresholds,
    pub policy: RemediationPolicy,
    pub workers: usize,
}

impl Default for HealerConfig {
    fn default() -> Self {
        HealerConfig {
            thresholds: HealthThresholds::default(),
            policy: RemediationPolicy::default(),
            workers: 8,
        }
    }
}

/// Healer turns pod notifications into corrective actions.
/// It keeps no state between pods; every notification is evaluated from scratch.
pub struct Healer {
    api: Arc<dyn ApiServer>,
    config: HealerConfig,
}

impl Healer {
    pub fn new(api: Arc<dyn ApiServer>, config: HealerConfig) -> Healer {
        Healer { api, config }
    }

    pub async fn handle_pod(&self, pod: &Pod, now: DateTime<Utc>) -> Result<HealOutcome, Error> {
        if !self.config.policy.should_evaluate(pod) {
            return Ok(HealOutcome::Skipped);
        }
        let verdict = classify(pod, now, &self.config.thresholds);
        if verdict.is_healthy() {
            return Ok(HealOutcome::Skipped);
        }
        info!(
            "Pod {}/{} is {}",
            pod.namespace().unwrap_or_default(),
            pod.name_any(),
            verdict
        );
        let action = decide(pod, verdict);
        execute(self.api.as_ref(), pod, action).await
    }

    /// Processes notifications until the channel closes or shutdown is requested.
    /// Handlers already running are allowed to finish.
    pub async fn run(&self, rx: mpsc::Receiver<WatchEvent<Pod>>, shutdown: CancellationToken) {
        let workers = self.config.workers.max(1);
        info!("Starting pod healer with {} workers", workers);
        let events = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|event| (event, rx)) });
        events
            .take_until(shutdown.cancelled())
            .for_each_concurrent(workers, |event| async move {
                let pod = event.object();
                debug!("Evaluating Pod {}/{}", pod.namespace().unwrap_or_default(), pod.name_any());
                if let Err(err) = self.handle_pod(pod, Utc::now()).await {
                    warn!("Healing failed: {}", err);
                }
            })
            .await;
        info!("Pod healer stopped");
    }
}
