// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ConfigError;
use crate::kubernetes_api_objects::error::APIError;
use kube::runtime::watcher;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),

    #[error("Shim layer error: {0}")]
    ShimLayerError(String),

    #[error("Reconcile {0} ended with an error")]
    ReconcileCoreError(String),

    #[error("Failed to heal pod {key}: {source}")]
    HealPodFailed {
        key: String,
        #[source]
        source: APIError,
    },

    #[error("Watch failed {retries} times in a row, giving up: {source}")]
    WatchRetriesExhausted {
        retries: usize,
        #[source]
        source: watcher::Error,
    },

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}
