// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::error::*;
use crate::kubernetes_api_objects::marshal::marshal;
use kube::api::{ApiResource, DynamicObject, Resource};
use serde::Serialize;

// KubeAPIRequest represents the API requests the controllers send.
//
// kube-rs uses a generic type kube::api::Api as an api handle to send
// requests to the Kubernetes API.
// So KubeAPIRequest wraps around the variables used to instantiate
// kube::api::Api<DynamicObject> and to call its methods.
#[derive(Debug, Clone)]
pub enum KubeAPIRequest {
    GetRequest(KubeGetRequest),
    CreateRequest(KubeCreateRequest),
    UpdateRequest(KubeUpdateRequest),
    UpdateStatusRequest(KubeUpdateStatusRequest),
    DeleteRequest(KubeDeleteRequest),
}

impl KubeAPIRequest {
    pub fn key(&self) -> String {
        match self {
            KubeAPIRequest::GetRequest(req) => req.key(),
            KubeAPIRequest::CreateRequest(req) => req.key(),
            KubeAPIRequest::UpdateRequest(req) => req.key(),
            KubeAPIRequest::UpdateStatusRequest(req) => req.key(),
            KubeAPIRequest::DeleteRequest(req) => req.key(),
        }
    }

    pub fn verb(&self) -> Verb {
        match self {
            KubeAPIRequest::GetRequest(_) => Verb::Get,
            KubeAPIRequest::CreateRequest(_) => Verb::Create,
            KubeAPIRequest::UpdateRequest(_) => Verb::Update,
            KubeAPIRequest::UpdateStatusRequest(_) => Verb::UpdateStatus,
            KubeAPIRequest::DeleteRequest(_) => Verb::Delete,
        }
    }

    pub fn kind(&self) -> &str {
        let api_resource = match self {
            KubeAPIRequest::GetRequest(req) => &req.api_resource,
            KubeAPIRequest::CreateRequest(req) => &req.api_resource,
            KubeAPIRequest::UpdateRequest(req) => &req.api_resource,
            KubeAPIRequest::UpdateStatusRequest(req) => &req.api_resource,
            KubeAPIRequest::DeleteRequest(req) => &req.api_resource,
        };
        &api_resource.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl Verb {
    /// Whether a request with this verb changes state on the API server.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Get)
    }
}

// KubeGetRequest has the name as the parameter of Api.get(), and namespace to instantiate an Api.
#[derive(Debug, Clone)]
pub struct KubeGetRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
}

impl KubeGetRequest {
    pub fn of<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> KubeGetRequest {
        KubeGetRequest {
            api_resource: ApiResource::erase::<K>(&()),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeCreateRequest has the obj as the parameter of Api.create().
#[derive(Debug, Clone)]
pub struct KubeCreateRequest {
    pub api_resource: ApiResource,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeCreateRequest {
    pub fn of<K>(namespace: &str, obj: &K) -> Result<KubeCreateRequest, ParseDynamicObjectError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(KubeCreateRequest {
            api_resource: ApiResource::erase::<K>(&()),
            namespace: namespace.to_string(),
            obj: marshal(obj)?,
        })
    }

    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_resource.kind,
            self.namespace,
            self.obj.metadata.name.as_deref().unwrap_or("")
        )
    }
}

// KubeUpdateRequest has the obj as the parameter of Api.replace().
// The resourceVersion carried in obj is checked by the API server.
#[derive(Debug, Clone)]
pub struct KubeUpdateRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeUpdateRequest {
    pub fn of<K>(namespace: &str, name: &str, obj: &K) -> Result<KubeUpdateRequest, ParseDynamicObjectError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(KubeUpdateRequest {
            api_resource: ApiResource::erase::<K>(&()),
            name: name.to_string(),
            namespace: namespace.to_string(),
            obj: marshal(obj)?,
        })
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeUpdateStatusRequest has the obj as the parameter of Api.replace_status().
#[derive(Debug, Clone)]
pub struct KubeUpdateStatusRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
    pub obj: DynamicObject,
}

impl KubeUpdateStatusRequest {
    pub fn of<K>(namespace: &str, name: &str, obj: &K) -> Result<KubeUpdateStatusRequest, ParseDynamicObjectError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(KubeUpdateStatusRequest {
            api_resource: ApiResource::erase::<K>(&()),
            name: name.to_string(),
            namespace: namespace.to_string(),
            obj: marshal(obj)?,
        })
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeDeleteRequest has the name as the parameter of Api.delete(), and namespace to instantiate an Api.
#[derive(Debug, Clone)]
pub struct KubeDeleteRequest {
    pub api_resource: ApiResource,
    pub name: String,
    pub namespace: String,
}

impl KubeDeleteRequest {
    pub fn of<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> KubeDeleteRequest {
        KubeDeleteRequest {
            api_resource: ApiResource::erase::<K>(&()),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.api_resource.kind, self.namespace, self.name)
    }
}

// KubeAPIResponse represents the API responses handed back to the controllers.
#[derive(Debug, Clone)]
pub enum KubeAPIResponse {
    GetResponse(KubeGetResponse),
    CreateResponse(KubeCreateResponse),
    UpdateResponse(KubeUpdateResponse),
    UpdateStatusResponse(KubeUpdateStatusResponse),
    DeleteResponse(KubeDeleteResponse),
}

impl KubeAPIResponse {
    /// The error carried by the response, whatever its variant.
    pub fn err(&self) -> Option<&APIError> {
        match self {
            KubeAPIResponse::GetResponse(resp) => resp.res.as_ref().err(),
            KubeAPIResponse::CreateResponse(resp) => resp.res.as_ref().err(),
            KubeAPIResponse::UpdateResponse(resp) => resp.res.as_ref().err(),
            KubeAPIResponse::UpdateStatusResponse(resp) => resp.res.as_ref().err(),
            KubeAPIResponse::DeleteResponse(resp) => resp.res.as_ref().err(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KubeGetResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeCreateResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeUpdateResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeUpdateStatusResponse {
    pub res: Result<DynamicObject, APIError>,
}

#[derive(Debug, Clone)]
pub struct KubeDeleteResponse {
    pub res: Result<(), APIError>,
}
