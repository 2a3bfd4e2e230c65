// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::pod_healer::{
    healer::HealerConfig, health::HealthThresholds, remediation::RemediationPolicy,
};
use crate::shim_layer::watch_cache::WatchCacheConfig;
use clap::{Args, Parser, Subcommand};
use kube::config::{InClusterError, KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::Client;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration {0:?}, expected <n>, <n>s, <n>m or <n>h")]
    InvalidDuration(String),

    #[error("duration {0:?} must be greater than zero")]
    ZeroDuration(String),

    #[error("--in-cluster and --kubeconfig cannot be used together")]
    ConflictingCredentials,

    #[error("no credentials: pass --in-cluster or --kubeconfig, or run inside a cluster")]
    MissingCredentials,

    #[error("failed to load in-cluster config: {0}")]
    InCluster(#[from] InClusterError),

    #[error("failed to load kubeconfig {path:?}: {source}")]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },

    #[error("failed to build client: {0}")]
    Client(#[from] kube::Error),
}

#[derive(Debug, Parser)]
#[command(name = "healing-controller", version)]
#[command(about = "Heals stuck pods and reconciles NginxDeployments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the NginxDeployment CRD as YAML
    Export,
    /// Run the pod healer and the NginxDeployment reconciler
    Run(RunArgs),
    /// Run only the pod healer
    Heal(RunArgs),
    /// Run only the NginxDeployment reconciler
    Reconcile(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Use the service account credentials mounted into the pod
    #[arg(long, env = "HEALING_IN_CLUSTER")]
    pub in_cluster: bool,

    /// Path to a kubeconfig file
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// How long a pod may stay Pending before it counts as stuck
    #[arg(long, env = "HEALING_PENDING_THRESHOLD", default_value = "15m", value_parser = parse_duration)]
    pub pending_threshold: Duration,

    /// Container restarts beyond which a running pod counts as crash looping
    #[arg(long, env = "HEALING_RESTART_THRESHOLD", default_value_t = 10)]
    pub restart_threshold: i32,

    /// How long a pod may report Ready=False before it counts as stuck
    #[arg(long, env = "HEALING_NOT_READY_THRESHOLD", default_value = "10m", value_parser = parse_duration)]
    pub not_ready_threshold: Duration,

    /// How often every watched object is re-delivered, and how often converged parents are re-reconciled
    #[arg(long, env = "HEALING_RESYNC_INTERVAL", default_value = "30s", value_parser = parse_nonzero_duration)]
    pub resync_interval: Duration,

    /// Consecutive watch failures tolerated before the process exits
    #[arg(long, env = "HEALING_MAX_WATCH_RETRIES", default_value_t = 10)]
    pub max_watch_retries: usize,

    /// Number of pods evaluated concurrently
    #[arg(long, env = "HEALING_WORKERS", default_value_t = 8, value_parser = clap::value_parser!(u16).range(1..))]
    pub healer_workers: u16,

    /// Namespace whose pods are never healed (repeatable)
    #[arg(
        long = "excluded-namespace",
        env = "HEALING_EXCLUDED_NAMESPACES",
        value_delimiter = ',',
        default_value = "kube-system"
    )]
    pub excluded_namespaces: Vec<String>,

    /// Only watch pods in this namespace
    #[arg(long, env = "HEALING_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "HEALING_LOG_JSON")]
    pub log_json: bool,
}

impl RunArgs {
    pub fn thresholds(&self) -> HealthThresholds {
        HealthThresholds {
            pending: self.pending_threshold,
            restarts: self.restart_threshold,
            not_ready: self.not_ready_threshold,
        }
    }

    pub fn healer_config(&self) -> HealerConfig {
        HealerConfig {
            thresholds: self.thresholds(),
            policy: RemediationPolicy {
                excluded_namespaces: self.excluded_namespaces.clone(),
            },
            workers: usize::from(self.healer_workers),
        }
    }

    pub fn watch_cache_config(&self) -> WatchCacheConfig {
        WatchCacheConfig {
            namespace: self.watch_namespace.clone(),
            resync_interval: self.resync_interval,
            max_retries: self.max_watch_retries,
        }
    }

    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        resolve_credentials(
            self.in_cluster,
            self.kubeconfig.clone(),
            std::env::var_os(SERVICE_HOST_ENV).is_some(),
        )
    }
}

/// Parses `<n>`, `<n>s`, `<n>m` or `<n>h`; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let (digits, unit_secs) = match s.char_indices().last() {
        Some((idx, 's')) => (&s[..idx], 1),
        Some((idx, 'm')) => (&s[..idx], 60),
        Some((idx, 'h')) => (&s[..idx], 60 * 60),
        _ => (s, 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(s.to_string()))?;
    n.checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}

/// Like parse_duration, but rejects zero.
pub fn parse_nonzero_duration(s: &str) -> Result<Duration, ConfigError> {
    let duration = parse_duration(s)?;
    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration(s.trim().to_string()));
    }
    Ok(duration)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    InCluster,
    Kubeconfig(PathBuf),
}

pub fn resolve_credentials(
    in_cluster: bool,
    kubeconfig: Option<PathBuf>,
    service_host_present: bool,
) -> Result<Credentials, ConfigError> {
    match (in_cluster, kubeconfig) {
        (true, Some(_)) => Err(ConfigError::ConflictingCredentials),
        (true, None) => Ok(Credentials::InCluster),
        (false, Some(path)) => Ok(Credentials::Kubeconfig(path)),
        (false, None) if service_host_present => Ok(Credentials::InCluster),
        (false, None) => Err(ConfigError::MissingCredentials),
    }
}

pub async fn build_client(credentials: &Credentials) -> Result<Client, ConfigError> {
    let config = match credentials {
        Credentials::InCluster => kube::Config::incluster()?,
        Credentials::Kubeconfig(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|source| ConfigError::Kubeconfig {
                path: path.clone(),
                source,
            })?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|source| ConfigError::Kubeconfig {
                    path: path.clone(),
                    source,
                })?
        }
    };
    Ok(Client::try_from(config)?)
}
