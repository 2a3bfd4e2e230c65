// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::executable_model::{
    api_server_state::{ApiServerState, InjectedFault, RequestRecord},
    object_map::ObjectMapKey,
};
use crate::kubernetes_api_objects::{
    api_method::*,
    error::*,
    marshal::{marshal, unmarshal},
};
use crate::shim_layer::api_server::ApiServer;
use async_trait::async_trait;
use kube::api::{DynamicObject, Resource};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

// The ExecutableApiServer is an in-memory model of the Kubernetes API server.
// It enforces the parts of the API semantics the controllers rely on
// (name uniqueness, resourceVersion-based optimistic concurrency,
// spec/status separation) and records every request it serves,
// so controllers can be exercised end to end without a cluster.
#[derive(Debug)]
pub struct ExecutableApiServer {
    state: Mutex<ApiServerState>,
}

impl Default for ExecutableApiServer {
    fn default() -> Self {
        ExecutableApiServer::new()
    }
}

fn status_of(obj: &DynamicObject) -> Option<serde_json::Value> {
    obj.data.get("status").cloned()
}

fn set_status(obj: &mut DynamicObject, status: Option<serde_json::Value>) {
    if let Some(data) = obj.data.as_object_mut() {
        match status {
            Some(status) => {
                data.insert("status".to_string(), status);
            }
            None => {
                data.remove("status");
            }
        }
    }
}

impl ExecutableApiServer {
    pub fn new() -> ExecutableApiServer {
        ExecutableApiServer {
            state: Mutex::new(ApiServerState::new()),
        }
    }

    fn handle_get_request(req: &KubeGetRequest, s: &ApiServerState) -> KubeGetResponse {
        let key = ObjectMapKey::new(&req.api_resource.kind, &req.namespace, &req.name);
        match s.resources.get(&key) {
            None => KubeGetResponse { res: Err(APIError::ObjectNotFound) },
            Some(obj) => KubeGetResponse { res: Ok(obj.clone()) },
        }
    }

    fn create_request_admission_check(req: &KubeCreateRequest, s: &ApiServerState) -> Option<APIError> {
        match &req.obj.metadata.name {
            None => Some(APIError::Invalid),
            Some(_) if req.obj.metadata.namespace.as_ref().is_some_and(|ns| ns != &req.namespace) => {
                Some(APIError::BadRequest)
            }
            Some(name) => {
                let key = ObjectMapKey::new(&req.api_resource.kind, &req.namespace, name);
                if s.resources.contains_key(&key) {
                    Some(APIError::ObjectAlreadyExists)
                } else {
                    None
                }
            }
        }
    }

    fn handle_create_request(req: &KubeCreateRequest, s: &mut ApiServerState) -> KubeCreateResponse {
        if let Some(err) = Self::create_request_admission_check(req, s) {
            return KubeCreateResponse { res: Err(err) };
        }
        let mut created_obj = req.obj.clone();
        created_obj.metadata.namespace = Some(req.namespace.clone());
        created_obj.metadata.resource_version = Some(s.resource_version_counter.to_string());
        created_obj.metadata.uid = Some(format!("uid-{}", s.uid_counter));
        let key = ObjectMapKey::new(
            &req.api_resource.kind,
            &req.namespace,
            created_obj.metadata.name.as_deref().unwrap_or_default(),
        );
        s.resources.insert(key, created_obj.clone());
        s.uid_counter += 1;
        s.resource_version_counter += 1;
        KubeCreateResponse { res: Ok(created_obj) }
    }

    fn update_request_admission_check_helper(
        kind: &str,
        name: &str,
        namespace: &str,
        obj: &DynamicObject,
        s: &ApiServerState,
    ) -> Option<APIError> {
        let key = ObjectMapKey::new(kind, namespace, name);
        match &obj.metadata.name {
            None => return Some(APIError::BadRequest),
            Some(obj_name) if obj_name != name => return Some(APIError::BadRequest),
            _ => {}
        }
        if obj.metadata.namespace.as_ref().is_some_and(|ns| ns != namespace) {
            return Some(APIError::BadRequest);
        }
        let old_obj = match s.resources.get(&key) {
            Some(old_obj) => old_obj,
            None => return Some(APIError::ObjectNotFound),
        };
        if obj.metadata.resource_version.is_some() && obj.metadata.resource_version != old_obj.metadata.resource_version {
            Some(APIError::Conflict)
        } else if obj.metadata.uid.is_some() && obj.metadata.uid != old_obj.metadata.uid {
            Some(APIError::InternalError)
        } else {
            None
        }
    }

    fn handle_update_request(req: &KubeUpdateRequest, s: &mut ApiServerState) -> KubeUpdateResponse {
        let key = ObjectMapKey::new(&req.api_resource.kind, &req.namespace, &req.name);
        let old_obj = match s.resources.get(&key) {
            None => return KubeUpdateResponse { res: Err(APIError::ObjectNotFound) },
            Some(old_obj) => old_obj.clone(),
        };
        if let Some(err) =
            Self::update_request_admission_check_helper(&req.api_resource.kind, &req.name, &req.namespace, &req.obj, s)
        {
            return KubeUpdateResponse { res: Err(err) };
        }
        // The spec update path never touches status.
        let mut updated_obj = req.obj.clone();
        updated_obj.metadata.namespace = Some(req.namespace.clone());
        updated_obj.metadata.uid = old_obj.metadata.uid.clone();
        updated_obj.metadata.resource_version = old_obj.metadata.resource_version.clone();
        set_status(&mut updated_obj, status_of(&old_obj));
        if updated_obj == old_obj {
            return KubeUpdateResponse { res: Ok(old_obj) };
        }
        updated_obj.metadata.resource_version = Some(s.resource_version_counter.to_string());
        s.resources.insert(key, updated_obj.clone());
        s.resource_version_counter += 1;
        KubeUpdateResponse { res: Ok(updated_obj) }
    }

    fn handle_update_status_request(req: &KubeUpdateStatusRequest, s: &mut ApiServerState) -> KubeUpdateStatusResponse {
        let key = ObjectMapKey::new(&req.api_resource.kind, &req.namespace, &req.name);
        let old_obj = match s.resources.get(&key) {
            None => return KubeUpdateStatusResponse { res: Err(APIError::ObjectNotFound) },
            Some(old_obj) => old_obj.clone(),
        };
        if let Some(err) =
            Self::update_request_admission_check_helper(&req.api_resource.kind, &req.name, &req.namespace, &req.obj, s)
        {
            return KubeUpdateStatusResponse { res: Err(err) };
        }
        // The status update path only takes status from the request.
        let mut status_updated_obj = old_obj.clone();
        set_status(&mut status_updated_obj, status_of(&req.obj));
        if status_updated_obj == old_obj {
            return KubeUpdateStatusResponse { res: Ok(old_obj) };
        }
        status_updated_obj.metadata.resource_version = Some(s.resource_version_counter.to_string());
        s.resources.insert(key, status_updated_obj.clone());
        s.resource_version_counter += 1;
        KubeUpdateStatusResponse { res: Ok(status_updated_obj) }
    }

    fn handle_delete_request(req: &KubeDeleteRequest, s: &mut ApiServerState) -> KubeDeleteResponse {
        let key = ObjectMapKey::new(&req.api_resource.kind, &req.namespace, &req.name);
        match s.resources.remove(&key) {
            None => KubeDeleteResponse { res: Err(APIError::ObjectNotFound) },
            Some(_) => {
                s.resource_version_counter += 1;
                KubeDeleteResponse { res: Ok(()) }
            }
        }
    }

    fn fault_response(req: &KubeAPIRequest, err: APIError) -> KubeAPIResponse {
        match req {
            KubeAPIRequest::GetRequest(_) => KubeAPIResponse::GetResponse(KubeGetResponse { res: Err(err) }),
            KubeAPIRequest::CreateRequest(_) => KubeAPIResponse::CreateResponse(KubeCreateResponse { res: Err(err) }),
            KubeAPIRequest::UpdateRequest(_) => KubeAPIResponse::UpdateResponse(KubeUpdateResponse { res: Err(err) }),
            KubeAPIRequest::UpdateStatusRequest(_) => {
                KubeAPIResponse::UpdateStatusResponse(KubeUpdateStatusResponse { res: Err(err) })
            }
            KubeAPIRequest::DeleteRequest(_) => KubeAPIResponse::DeleteResponse(KubeDeleteResponse { res: Err(err) }),
        }
    }

    /// Makes the next request with this verb on this kind fail with the given error.
    pub async fn inject_fault(&self, verb: Verb, kind: &str, error: APIError) {
        self.state.lock().await.faults.push(InjectedFault {
            verb,
            kind: kind.to_string(),
            error,
        });
    }

    /// Stores an object directly, as if another actor had written it.
    /// The write bypasses the request log.
    pub async fn insert_object<K>(&self, obj: &K) -> Result<(), ParseDynamicObjectError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut dynamic = marshal(obj)?;
        let mut s = self.state.lock().await;
        let namespace = dynamic.metadata.namespace.clone().unwrap_or_default();
        let name = dynamic.metadata.name.clone().unwrap_or_default();
        let key = ObjectMapKey::new(&K::kind(&()), &namespace, &name);
        if dynamic.metadata.uid.is_none() {
            dynamic.metadata.uid = Some(format!("uid-{}", s.uid_counter));
            s.uid_counter += 1;
        }
        dynamic.metadata.resource_version = Some(s.resource_version_counter.to_string());
        s.resource_version_counter += 1;
        s.resources.insert(key, dynamic);
        Ok(())
    }

    pub async fn get_object<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let s = self.state.lock().await;
        let key = ObjectMapKey::new(&K::kind(&()), namespace, name);
        let obj = s.resources.get(&key)?.clone();
        unmarshal(obj).ok()
    }

    pub async fn object_count(&self) -> usize {
        self.state.lock().await.resources.len()
    }

    pub async fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().await.requests.clone()
    }

    pub async fn mutating_requests(&self) -> Vec<RequestRecord> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|record| record.verb.is_mutating())
            .cloned()
            .collect()
    }

    /// Number of requests served with this verb on this kind.
    pub async fn count_requests(&self, verb: Verb, kind: &str) -> usize {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .filter(|record| record.verb == verb && record.kind == kind)
            .count()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }
}

#[async_trait]
impl ApiServer for ExecutableApiServer {
    async fn handle(&self, req: KubeAPIRequest) -> KubeAPIResponse {
        let mut s = self.state.lock().await;
        s.requests.push(RequestRecord {
            verb: req.verb(),
            kind: req.kind().to_string(),
            key: req.key(),
        });
        if let Some(err) = s.take_fault(req.verb(), req.kind()) {
            return Self::fault_response(&req, err);
        }
        match &req {
            KubeAPIRequest::GetRequest(get_req) => KubeAPIResponse::GetResponse(Self::handle_get_request(get_req, &s)),
            KubeAPIRequest::CreateRequest(create_req) => {
                KubeAPIResponse::CreateResponse(Self::handle_create_request(create_req, &mut s))
            }
            KubeAPIRequest::UpdateRequest(update_req) => {
                KubeAPIResponse::UpdateResponse(Self::handle_update_request(update_req, &mut s))
            }
            KubeAPIRequest::UpdateStatusRequest(update_status_req) => {
                KubeAPIResponse::UpdateStatusResponse(Self::handle_update_status_request(update_status_req, &mut s))
            }
            KubeAPIRequest::DeleteRequest(delete_req) => {
                KubeAPIResponse::DeleteResponse(Self::handle_delete_request(delete_req, &mut s))
            }
        }
    }
}
