// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::controllers::nginx_controller::exec::{resources::*, status::*};
use crate::controllers::nginx_controller::trusted::step::NginxDeploymentReconcileStep;
use crate::crds::NginxDeployment;
use crate::kubernetes_api_objects::{api_method::*, error::APIError, marshal::unmarshal};
use crate::reconciler::exec::reconciler::Reconciler;
use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service};
use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{info, warn};

// NginxDeploymentReconcileState describes the local state with which the reconcile functions makes decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NginxDeploymentReconcileState {
    pub reconcile_step: NginxDeploymentReconcileStep,
}

pub struct NginxDeploymentReconciler {}

impl Reconciler for NginxDeploymentReconciler {
    type K = NginxDeployment;
    type S = NginxDeploymentReconcileState;

    fn reconcile_init_state() -> Self::S {
        reconcile_init_state()
    }

    fn reconcile_core(nd: &Self::K, resp_o: Option<KubeAPIResponse>, state: Self::S) -> (Self::S, Option<KubeAPIRequest>) {
        reconcile_core(nd, resp_o, state)
    }

    fn reconcile_done(state: &Self::S) -> bool {
        reconcile_done(state)
    }

    fn reconcile_error(state: &Self::S) -> bool {
        reconcile_error(state)
    }
}

pub fn reconcile_init_state() -> NginxDeploymentReconcileState {
    step_state(NginxDeploymentReconcileStep::Init)
}

pub fn reconcile_done(state: &NginxDeploymentReconcileState) -> bool {
    matches!(state.reconcile_step, NginxDeploymentReconcileStep::Done)
}

pub fn reconcile_error(state: &NginxDeploymentReconcileState) -> bool {
    matches!(state.reconcile_step, NginxDeploymentReconcileStep::Error)
}

pub fn reconcile_core(
    nd: &NginxDeployment,
    resp_o: Option<KubeAPIResponse>,
    state: NginxDeploymentReconcileState,
) -> (NginxDeploymentReconcileState, Option<KubeAPIRequest>) {
    let namespace = match nd.namespace() {
        Some(namespace) if nd.metadata.name.is_some() => namespace,
        _ => return (error_state(), None),
    };
    match state.reconcile_step {
        NginxDeploymentReconcileStep::Init => {
            let req = KubeGetRequest::of::<Deployment>(&namespace, &deployment_name(nd));
            let state_prime = step_state(NginxDeploymentReconcileStep::AfterGetDeployment);
            (state_prime, Some(KubeAPIRequest::GetRequest(req)))
        }
        NginxDeploymentReconcileStep::AfterGetDeployment => match get_response(resp_o) {
            Some(Ok(obj)) => match unmarshal::<Deployment>(obj) {
                Ok(found) => update_deployment_if_drifted(nd, &namespace, found),
                Err(_) => (error_state(), None),
            },
            Some(Err(APIError::ObjectNotFound)) => {
                let desired = make_deployment(nd);
                info!("Create Deployment {}/{}", namespace, deployment_name(nd));
                match KubeCreateRequest::of(&namespace, &desired) {
                    Ok(req) => {
                        let state_prime = step_state(NginxDeploymentReconcileStep::AfterCreateDeployment);
                        (state_prime, Some(KubeAPIRequest::CreateRequest(req)))
                    }
                    Err(_) => (error_state(), None),
                }
            }
            _ => (error_state(), None),
        },
        NginxDeploymentReconcileStep::AfterCreateDeployment => match create_response(resp_o) {
            Some(Ok(_)) | Some(Err(APIError::ObjectAlreadyExists)) => get_service(nd, &namespace),
            _ => (error_state(), None),
        },
        NginxDeploymentReconcileStep::AfterUpdateDeployment => match update_response(resp_o) {
            Some(Ok(_)) => get_service(nd, &namespace),
            _ => (error_state(), None),
        },
        NginxDeploymentReconcileStep::AfterGetService => match get_response(resp_o) {
            // The Service is created once and never compared against its desired form afterwards.
            Some(Ok(_)) => get_deployment_for_status(nd, &namespace),
            Some(Err(APIError::ObjectNotFound)) => {
                let desired = make_service(nd);
                info!("Create Service {}/{}", namespace, service_name(nd));
                match KubeCreateRequest::of(&namespace, &desired) {
                    Ok(req) => {
                        let state_prime = step_state(NginxDeploymentReconcileStep::AfterCreateService);
                        (state_prime, Some(KubeAPIRequest::CreateRequest(req)))
                    }
                    Err(_) => (error_state(), None),
                }
            }
            _ => (error_state(), None),
        },
        NginxDeploymentReconcileStep::AfterCreateService => match create_response(resp_o) {
            Some(Ok(_)) | Some(Err(APIError::ObjectAlreadyExists)) => get_deployment_for_status(nd, &namespace),
            _ => (error_state(), None),
        },
        NginxDeploymentReconcileStep::AfterGetDeploymentForStatus => match get_response(resp_o) {
            Some(Ok(obj)) => match unmarshal::<Deployment>(obj) {
                Ok(found) => update_status_if_changed(nd, &namespace, &found),
                Err(_) => (error_state(), None),
            },
            _ => {
                warn!("Deployment {}/{} is missing, cannot update status", namespace, deployment_name(nd));
                (error_state(), None)
            }
        },
        NginxDeploymentReconcileStep::AfterUpdateStatus => match update_status_response(resp_o) {
            Some(Ok(_)) => (done_state(), None),
            _ => (error_state(), None),
        },
        _ => (state, None),
    }
}

fn update_deployment_if_drifted(
    nd: &NginxDeployment,
    namespace: &str,
    found: Deployment,
) -> (NginxDeploymentReconcileState, Option<KubeAPIRequest>) {
    let desired = make_deployment(nd);
    if !deployment_drifted(&found, &desired) {
        return get_service(nd, namespace);
    }
    let name = deployment_name(nd);
    info!("Update Deployment {}/{}", namespace, name);
    // Keep the found object's metadata so the resourceVersion guards the write.
    let updated = Deployment {
        spec: desired.spec,
        ..found
    };
    match KubeUpdateRequest::of(namespace, &name, &updated) {
        Ok(req) => {
            let state_prime = step_state(NginxDeploymentReconcileStep::AfterUpdateDeployment);
            (state_prime, Some(KubeAPIRequest::UpdateRequest(req)))
        }
        Err(_) => (error_state(), None),
    }
}

fn get_service(nd: &NginxDeployment, namespace: &str) -> (NginxDeploymentReconcileState, Option<KubeAPIRequest>) {
    let req = KubeGetRequest::of::<Service>(namespace, &service_name(nd));
    let state_prime = step_state(NginxDeploymentReconcileStep::AfterGetService);
    (state_prime, Some(KubeAPIRequest::GetRequest(req)))
}

fn get_deployment_for_status(nd: &NginxDeployment, namespace: &str) -> (NginxDeploymentReconcileState, Option<KubeAPIRequest>) {
    let req = KubeGetRequest::of::<Deployment>(namespace, &deployment_name(nd));
    let state_prime = step_state(NginxDeploymentReconcileStep::AfterGetDeploymentForStatus);
    (state_prime, Some(KubeAPIRequest::GetRequest(req)))
}

fn update_status_if_changed(
    nd: &NginxDeployment,
    namespace: &str,
    deployment: &Deployment,
) -> (NginxDeploymentReconcileState, Option<KubeAPIRequest>) {
    let status = make_status(nd, deployment);
    if !status_changed(nd, &status) {
        return (done_state(), None);
    }
    let name = nd.name_any();
    info!("Update status of NginxDeployment {}/{}", namespace, name);
    let updated = NginxDeployment {
        status: Some(status),
        ..nd.clone()
    };
    match KubeUpdateStatusRequest::of(namespace, &name, &updated) {
        Ok(req) => {
            let state_prime = step_state(NginxDeploymentReconcileStep::AfterUpdateStatus);
            (state_prime, Some(KubeAPIRequest::UpdateStatusRequest(req)))
        }
        Err(_) => (error_state(), None),
    }
}

fn get_response(resp_o: Option<KubeAPIResponse>) -> Option<Result<DynamicObject, APIError>> {
    match resp_o {
        Some(KubeAPIResponse::GetResponse(resp)) => Some(resp.res),
        _ => None,
    }
}

fn create_response(resp_o: Option<KubeAPIResponse>) -> Option<Result<DynamicObject, APIError>> {
    match resp_o {
        Some(KubeAPIResponse::CreateResponse(resp)) => Some(resp.res),
        _ => None,
    }
}

fn update_response(resp_o: Option<KubeAPIResponse>) -> Option<Result<DynamicObject, APIError>> {
    match resp_o {
        Some(KubeAPIResponse::UpdateResponse(resp)) => Some(resp.res),
        _ => None,
    }
}

fn update_status_response(resp_o: Option<KubeAPIResponse>) -> Option<Result<DynamicObject, APIError>> {
    match resp_o {
        Some(KubeAPIResponse::UpdateStatusResponse(resp)) => Some(resp.res),
        _ => None,
    }
}

fn step_state(reconcile_step: NginxDeploymentReconcileStep) -> NginxDeploymentReconcileState {
    NginxDeploymentReconcileState { reconcile_step }
}

pub fn done_state() -> NginxDeploymentReconcileState {
    step_state(NginxDeploymentReconcileStep::Done)
}

pub fn error_state() -> NginxDeploymentReconcileState {
    step_state(NginxDeploymentReconcileStep::Error)
}
