// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use clap::Parser;
use healing_controllers::config::{build_client, Cli, Command, RunArgs};
use healing_controllers::controllers::nginx_controller::exec::reconciler::NginxDeploymentReconciler;
use healing_controllers::controllers::pod_healer::healer::Healer;
use healing_controllers::crds::NginxDeployment;
use healing_controllers::shim_layer::{
    api_server::{ApiServer, KubeApiServer},
    controller_runtime::{run_controller, Data},
    watch_cache::WatchCache,
};
use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Pod, Service},
};
use kube::{
    api::Api,
    runtime::{controller::Controller, watcher},
    CustomResourceExt,
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const POD_EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Export => {
            println!("{}", serde_yaml::to_string(&NginxDeployment::crd())?);
            Ok(())
        }
        Command::Run(args) => run(args, true, true).await,
        Command::Heal(args) => run(args, true, false).await,
        Command::Reconcile(args) => run(args, false, true).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn run(args: RunArgs, heal: bool, reconcile: bool) -> Result<()> {
    init_tracing(args.log_json);
    let credentials = args.credentials()?;
    let client = build_client(&credentials).await?;
    let api: Arc<dyn ApiServer> = Arc::new(KubeApiServer::new(client.clone()));
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let mut tasks = JoinSet::new();
    if heal {
        info!("running pod healer");
        let (tx, rx) = mpsc::channel(POD_EVENT_CHANNEL_CAPACITY);
        let watch_cache = WatchCache::<Pod>::new(args.watch_cache_config());
        tasks.spawn(watch_cache.run(client.clone(), tx, shutdown.clone()));
        let healer = Healer::new(api.clone(), args.healer_config());
        let token = shutdown.clone();
        tasks.spawn(async move {
            healer.run(rx, token).await;
            Ok(())
        });
    }
    if reconcile {
        info!("running nginxdeployment reconciler");
        let controller = Controller::new(Api::<NginxDeployment>::all(client.clone()), watcher::Config::default())
            .owns(Api::<Deployment>::all(client.clone()), watcher::Config::default())
            .owns(Api::<Service>::all(client.clone()), watcher::Config::default());
        let data = Data {
            api: api.clone(),
            requeue_after: args.resync_interval,
        };
        tasks.spawn(run_controller::<NginxDeployment, NginxDeploymentReconciler>(
            controller,
            data,
            args.max_watch_retries,
            shutdown.clone(),
        ));
    }

    // A fatal error in one loop stops the other ones too.
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let res = match joined {
            Ok(res) => res.map_err(anyhow::Error::from),
            Err(err) => Err(anyhow::Error::from(err)),
        };
        if let Err(err) = res {
            error!("Shutting down after fatal error: {}", err);
            shutdown.cancel();
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
