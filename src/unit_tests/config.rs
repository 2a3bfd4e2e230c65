// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::*;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[test]
pub fn test_cli_is_well_formed() {
    Cli::command().debug_assert();
}

#[test]
pub fn test_parse_duration() {
    assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(15 * 60));
    assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(2 * 3600));
    assert_eq!(parse_duration(" 10m ").unwrap(), Duration::from_secs(600));
    for bad in ["", "m", "-5s", "1.5m", "10d", "ten"] {
        assert!(matches!(parse_duration(bad), Err(ConfigError::InvalidDuration(_))), "{:?}", bad);
    }
}

#[test]
pub fn test_parse_nonzero_duration() {
    assert_eq!(parse_nonzero_duration("1s").unwrap(), Duration::from_secs(1));
    assert_eq!(parse_nonzero_duration("30").unwrap(), Duration::from_secs(30));
    for zero in ["0", "0s", "0m", " 0h "] {
        assert!(matches!(parse_nonzero_duration(zero), Err(ConfigError::ZeroDuration(_))), "{:?}", zero);
    }
    assert!(matches!(parse_nonzero_duration("soon"), Err(ConfigError::InvalidDuration(_))));
    // Zero thresholds stay valid: every stuck pod is then acted on at once.
    assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
}

#[test]
pub fn test_resolve_credentials() {
    let path = PathBuf::from("/tmp/kubeconfig");
    assert_eq!(resolve_credentials(true, None, false).unwrap(), Credentials::InCluster);
    assert_eq!(
        resolve_credentials(false, Some(path.clone()), true).unwrap(),
        Credentials::Kubeconfig(path.clone())
    );
    assert_eq!(resolve_credentials(false, None, true).unwrap(), Credentials::InCluster);
    assert!(matches!(
        resolve_credentials(false, None, false),
        Err(ConfigError::MissingCredentials)
    ));
    assert!(matches!(
        resolve_credentials(true, Some(path), false),
        Err(ConfigError::ConflictingCredentials)
    ));
}

fn run_args(args: &[&str]) -> RunArgs {
    let mut argv = vec!["healing-controller", "run"];
    argv.extend_from_slice(args);
    match Cli::try_parse_from(argv).unwrap().command {
        Command::Run(run_args) => run_args,
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
pub fn test_run_defaults() {
    let args = run_args(&[]);
    let healer_config = args.healer_config();
    assert_eq!(healer_config.thresholds.pending, Duration::from_secs(15 * 60));
    assert_eq!(healer_config.thresholds.restarts, 10);
    assert_eq!(healer_config.thresholds.not_ready, Duration::from_secs(10 * 60));
    assert_eq!(healer_config.workers, 8);
    assert_eq!(healer_config.policy.excluded_namespaces, vec!["kube-system".to_string()]);
    let watch_config = args.watch_cache_config();
    assert_eq!(watch_config.resync_interval, Duration::from_secs(30));
    assert_eq!(watch_config.max_retries, 10);
    assert!(watch_config.namespace.is_none());
}

#[test]
pub fn test_run_overrides() {
    let args = run_args(&[
        "--pending-threshold",
        "5m",
        "--restart-threshold",
        "3",
        "--not-ready-threshold",
        "90s",
        "--resync-interval",
        "1m",
        "--max-watch-retries",
        "2",
        "--healer-workers",
        "4",
        "--excluded-namespace",
        "kube-system",
        "--excluded-namespace",
        "monitoring",
        "--watch-namespace",
        "team-a",
        "--log-json",
    ]);
    let thresholds = args.thresholds();
    assert_eq!(thresholds.pending, Duration::from_secs(300));
    assert_eq!(thresholds.restarts, 3);
    assert_eq!(thresholds.not_ready, Duration::from_secs(90));
    assert_eq!(args.resync_interval, Duration::from_secs(60));
    assert_eq!(args.healer_config().workers, 4);
    assert_eq!(
        args.healer_config().policy.excluded_namespaces,
        vec!["kube-system".to_string(), "monitoring".to_string()]
    );
    assert_eq!(args.watch_cache_config().namespace.as_deref(), Some("team-a"));
    assert_eq!(args.watch_cache_config().max_retries, 2);
    assert!(args.log_json);
}

#[test]
pub fn test_invalid_values_are_rejected() {
    assert!(Cli::try_parse_from(["healing-controller", "run", "--healer-workers", "0"]).is_err());
    assert!(Cli::try_parse_from(["healing-controller", "run", "--resync-interval", "soon"]).is_err());
    assert!(Cli::try_parse_from(["healing-controller", "run", "--resync-interval", "0"]).is_err());
    assert!(Cli::try_parse_from(["healing-controller", "reconcile", "--resync-interval", "0s"]).is_err());
    assert!(Cli::try_parse_from(["healing-controller", "run", "--pending-threshold", "0"]).is_ok());
    assert!(Cli::try_parse_from(["healing-controller", "unknown"]).is_err());
}

#[test]
pub fn test_subcommands() {
    assert!(matches!(
        Cli::try_parse_from(["healing-controller", "export"]).unwrap().command,
        Command::Export
    ));
    assert!(matches!(
        Cli::try_parse_from(["healing-controller", "heal"]).unwrap().command,
        Command::Heal(_)
    ));
    assert!(matches!(
        Cli::try_parse_from(["healing-controller", "reconcile", "--in-cluster"]).unwrap().command,
        Command::Reconcile(args) if args.in_cluster
    ));
}
