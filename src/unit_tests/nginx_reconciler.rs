// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::nginx_controller::exec::reconciler::*;
use crate::controllers::nginx_controller::trusted::step::NginxDeploymentReconcileStep;
use crate::crds::NginxDeployment;
use crate::error::Error;
use crate::executable_model::api_server::ExecutableApiServer;
use crate::kubernetes_api_objects::{api_method::*, error::APIError};
use crate::shim_layer::controller_runtime::{reconcile_with, Data, ERROR_REQUEUE_DELAY};
use crate::unit_tests::common::*;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

const RESYNC: Duration = Duration::from_secs(30);

async fn reconcile(api: &Arc<ExecutableApiServer>, nd: &NginxDeployment) -> Result<Action, Error> {
    let ctx = Arc::new(Data {
        api: api.clone(),
        requeue_after: RESYNC,
    });
    reconcile_with::<NginxDeployment, NginxDeploymentReconciler>(Arc::new(nd.clone()), ctx).await
}

async fn api_with_parent(nd: &NginxDeployment) -> Arc<ExecutableApiServer> {
    let api = Arc::new(ExecutableApiServer::new());
    api.insert_object(nd).await.unwrap();
    api
}

async fn set_available_replicas(api: &ExecutableApiServer, available_replicas: i32) {
    let mut deployment = api.get_object::<Deployment>("default", "web-deployment").await.unwrap();
    deployment.status = Some(DeploymentStatus {
        available_replicas: Some(available_replicas),
        ..DeploymentStatus::default()
    });
    api.insert_object(&deployment).await.unwrap();
}

fn scenario_parent() -> NginxDeployment {
    make_nginx_deployment("web", 3, Some(8080), Some("app:v1"))
}

#[tokio::test]
pub async fn test_first_reconcile_creates_children() {
    let api = api_with_parent(&scenario_parent()).await;
    let action = reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(action, Action::requeue(RESYNC));
    assert_eq!(api.count_requests(Verb::Create, "Deployment").await, 1);
    assert_eq!(api.count_requests(Verb::Create, "Service").await, 1);
    assert_eq!(api.count_requests(Verb::Update, "Deployment").await, 0);

    let parent = api.get_object::<NginxDeployment>("default", "web").await.unwrap();
    let deployment = api.get_object::<Deployment>("default", "web-deployment").await.unwrap();
    let spec = deployment.spec.clone().unwrap();
    assert_eq!(spec.replicas, Some(3));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8080);
    assert_eq!(container.image.as_deref(), Some("app:v1"));
    assert_eq!(
        deployment.metadata.owner_references.unwrap()[0].uid,
        parent.metadata.uid.clone().unwrap()
    );
    let service = api.get_object::<Service>("default", "web-service").await.unwrap();
    assert_eq!(service.spec.unwrap().ports.unwrap()[0].port, 8080);

    let status = parent.status.unwrap();
    assert_eq!(status.available_replicas, 0);
    assert_eq!(status.status.as_deref(), Some("Available: 0/3"));
}

#[tokio::test]
pub async fn test_converged_parent_costs_no_writes() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    api.clear_requests().await;
    let action = reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(action, Action::requeue(RESYNC));
    assert!(api.mutating_requests().await.is_empty());
}

#[tokio::test]
pub async fn test_status_becomes_ready_once_replicas_are_available() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    set_available_replicas(&api, 3).await;
    api.clear_requests().await;

    reconcile(&api, &scenario_parent()).await.unwrap();
    let mutating = api.mutating_requests().await;
    assert_eq!(mutating.len(), 1);
    assert_eq!(mutating[0].verb, Verb::UpdateStatus);
    let status = api
        .get_object::<NginxDeployment>("default", "web")
        .await
        .unwrap()
        .status
        .unwrap();
    assert_eq!(status.available_replicas, 3);
    assert_eq!(status.status.as_deref(), Some("Ready"));

    api.clear_requests().await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    assert!(api.mutating_requests().await.is_empty());
}

#[tokio::test]
pub async fn test_drifted_deployment_is_updated() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();

    let mut parent = api.get_object::<NginxDeployment>("default", "web").await.unwrap();
    parent.spec.replicas = 5;
    parent.spec.image = Some("app:v2".to_string());
    api.insert_object(&parent).await.unwrap();
    api.clear_requests().await;

    reconcile(&api, &parent).await.unwrap();
    assert_eq!(api.count_requests(Verb::Update, "Deployment").await, 1);
    assert_eq!(api.count_requests(Verb::Create, "Deployment").await, 0);
    let spec = api
        .get_object::<Deployment>("default", "web-deployment")
        .await
        .unwrap()
        .spec
        .unwrap();
    assert_eq!(spec.replicas, Some(5));
    assert_eq!(spec.template.spec.unwrap().containers[0].image.as_deref(), Some("app:v2"));
}

#[tokio::test]
pub async fn test_deployment_scaled_by_someone_else_is_restored() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    let mut deployment = api.get_object::<Deployment>("default", "web-deployment").await.unwrap();
    if let Some(spec) = deployment.spec.as_mut() {
        spec.replicas = Some(1);
    }
    api.insert_object(&deployment).await.unwrap();

    reconcile(&api, &scenario_parent()).await.unwrap();
    let restored = api.get_object::<Deployment>("default", "web-deployment").await.unwrap();
    assert_eq!(restored.spec.unwrap().replicas, Some(3));
}

#[tokio::test]
pub async fn test_service_is_created_once_and_never_updated() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    let mut service = api.get_object::<Service>("default", "web-service").await.unwrap();
    if let Some(ports) = service.spec.as_mut().and_then(|spec| spec.ports.as_mut()) {
        ports[0].port = 9999;
    }
    api.insert_object(&service).await.unwrap();
    api.clear_requests().await;

    reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(api.count_requests(Verb::Update, "Service").await, 0);
    assert_eq!(api.count_requests(Verb::Create, "Service").await, 0);
    let service = api.get_object::<Service>("default", "web-service").await.unwrap();
    assert_eq!(service.spec.unwrap().ports.unwrap()[0].port, 9999);
}

#[tokio::test]
pub async fn test_already_exists_on_create_counts_as_success() {
    let api = api_with_parent(&scenario_parent()).await;
    api.inject_fault(Verb::Create, "Service", APIError::ObjectAlreadyExists).await;
    let action = reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(action, Action::requeue(RESYNC));
    assert_eq!(api.count_requests(Verb::UpdateStatus, "NginxDeployment").await, 1);
}

#[tokio::test]
pub async fn test_conflict_ends_reconcile_with_error() {
    let api = api_with_parent(&scenario_parent()).await;
    reconcile(&api, &scenario_parent()).await.unwrap();
    let mut parent = api.get_object::<NginxDeployment>("default", "web").await.unwrap();
    parent.spec.replicas = 4;
    api.insert_object(&parent).await.unwrap();

    api.inject_fault(Verb::Update, "Deployment", APIError::Conflict).await;
    let err = reconcile(&api, &parent).await.unwrap_err();
    assert!(matches!(err, Error::ReconcileCoreError(key) if key == "NginxDeployment/default/web"));

    // The next trigger converges.
    reconcile(&api, &parent).await.unwrap();
    let deployment = api.get_object::<Deployment>("default", "web-deployment").await.unwrap();
    assert_eq!(deployment.spec.unwrap().replicas, Some(4));
}

#[tokio::test]
pub async fn test_missing_deployment_for_status_is_an_error() {
    let api = api_with_parent(&scenario_parent()).await;
    api.inject_fault(Verb::Create, "Deployment", APIError::ObjectAlreadyExists).await;
    let err = reconcile(&api, &scenario_parent()).await.unwrap_err();
    assert!(matches!(err, Error::ReconcileCoreError(_)));
    assert_eq!(api.count_requests(Verb::UpdateStatus, "NginxDeployment").await, 0);
}

#[tokio::test]
pub async fn test_deleted_parent_ends_quietly() {
    let api = Arc::new(ExecutableApiServer::new());
    let action = reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert!(api.mutating_requests().await.is_empty());
}

#[tokio::test]
pub async fn test_failed_parent_read_requeues() {
    let api = api_with_parent(&scenario_parent()).await;
    api.inject_fault(Verb::Get, "NginxDeployment", APIError::InternalError).await;
    let action = reconcile(&api, &scenario_parent()).await.unwrap();
    assert_eq!(action, Action::requeue(ERROR_REQUEUE_DELAY));
    assert!(api.mutating_requests().await.is_empty());
}

#[test]
pub fn test_reconcile_core_starts_with_get_deployment() {
    let nd = scenario_parent();
    let (state, req) = reconcile_core(&nd, None, reconcile_init_state());
    assert_eq!(state.reconcile_step, NginxDeploymentReconcileStep::AfterGetDeployment);
    match req {
        Some(KubeAPIRequest::GetRequest(get_req)) => {
            assert_eq!(get_req.key(), "Deployment/default/web-deployment");
        }
        other => panic!("unexpected request: {:?}", other),
    }
}

#[test]
pub fn test_reconcile_core_rejects_parent_without_namespace() {
    let mut nd = scenario_parent();
    nd.metadata.namespace = None;
    let (state, req) = reconcile_core(&nd, None, reconcile_init_state());
    assert!(reconcile_error(&state));
    assert!(req.is_none());
}

#[test]
pub fn test_reconcile_core_errors_on_unexpected_response() {
    let nd = scenario_parent();
    let (state, _) = reconcile_core(&nd, None, reconcile_init_state());
    let resp = KubeAPIResponse::DeleteResponse(KubeDeleteResponse { res: Ok(()) });
    let (state, req) = reconcile_core(&nd, Some(resp), state);
    assert!(reconcile_error(&state));
    assert!(!reconcile_done(&state));
    assert!(req.is_none());
}

#[test]
pub fn test_reconcile_core_walks_steps_from_responses_alone() {
    let nd = scenario_parent();
    let not_found = || KubeAPIResponse::GetResponse(KubeGetResponse {
        res: Err(APIError::ObjectNotFound),
    });

    let (state, _) = reconcile_core(&nd, None, reconcile_init_state());
    let (state, req) = reconcile_core(&nd, Some(not_found()), state);
    assert_eq!(state.reconcile_step, NginxDeploymentReconcileStep::AfterCreateDeployment);
    assert_eq!(req.map(|req| (req.verb(), req.key())), Some((Verb::Create, "Deployment/default/web-deployment".to_string())));

    let already_exists = KubeAPIResponse::CreateResponse(KubeCreateResponse {
        res: Err(APIError::ObjectAlreadyExists),
    });
    let (state, req) = reconcile_core(&nd, Some(already_exists), state);
    assert_eq!(state.reconcile_step, NginxDeploymentReconcileStep::AfterGetService);
    assert_eq!(req.map(|req| (req.verb(), req.key())), Some((Verb::Get, "Service/default/web-service".to_string())));

    let (state, req) = reconcile_core(&nd, Some(not_found()), state);
    assert_eq!(state.reconcile_step, NginxDeploymentReconcileStep::AfterCreateService);
    assert_eq!(req.map(|req| (req.verb(), req.key())), Some((Verb::Create, "Service/default/web-service".to_string())));

    // A missing Deployment at the status step is an error, not a create.
    let created = KubeAPIResponse::CreateResponse(KubeCreateResponse {
        res: Err(APIError::ObjectAlreadyExists),
    });
    let (state, _) = reconcile_core(&nd, Some(created), state);
    assert_eq!(state.reconcile_step, NginxDeploymentReconcileStep::AfterGetDeploymentForStatus);
    let (state, req) = reconcile_core(&nd, Some(not_found()), state);
    assert_eq!(state, error_state());
    assert!(req.is_none());
}

#[test]
pub fn test_terminal_states_are_fixed_points() {
    let nd = scenario_parent();
    for terminal in [done_state(), error_state()] {
        let (state, req) = reconcile_core(&nd, None, terminal.clone());
        assert_eq!(state, terminal);
        assert!(req.is_none());
    }
    assert!(reconcile_done(&done_state()));
    assert!(reconcile_error(&error_state()));
}
