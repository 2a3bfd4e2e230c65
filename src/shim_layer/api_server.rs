// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::api_method::*;
use crate::kubernetes_api_objects::error::*;
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, PostParams},
    Client,
};
use tracing::{debug, warn};

/// ApiServer is the boundary between the controllers and the Kubernetes API.
/// The controllers only ever describe what to send (a KubeAPIRequest);
/// an ApiServer sends it and reports the outcome.
#[async_trait]
pub trait ApiServer: Send + Sync {
    async fn handle(&self, req: KubeAPIRequest) -> KubeAPIResponse;
}

/// KubeApiServer sends requests to a real cluster through kube-rs.
#[derive(Clone)]
pub struct KubeApiServer {
    client: Client,
}

impl KubeApiServer {
    pub fn new(client: Client) -> KubeApiServer {
        KubeApiServer { client }
    }

    fn api_for(&self, namespace: &str, api_resource: &kube::api::ApiResource) -> Api<DynamicObject> {
        Api::<DynamicObject>::namespaced_with(self.client.clone(), namespace, api_resource)
    }
}

#[async_trait]
impl ApiServer for KubeApiServer {
    async fn handle(&self, req: KubeAPIRequest) -> KubeAPIResponse {
        let key = req.key();
        match req {
            KubeAPIRequest::GetRequest(get_req) => {
                let api = self.api_for(&get_req.namespace, &get_req.api_resource);
                let res = api.get(&get_req.name).await.map_err(|err| {
                    debug!("Get {} failed with error: {}", key, err);
                    kube_error_to_api(&err)
                });
                KubeAPIResponse::GetResponse(KubeGetResponse { res })
            }
            KubeAPIRequest::CreateRequest(create_req) => {
                let api = self.api_for(&create_req.namespace, &create_req.api_resource);
                let res = api
                    .create(&PostParams::default(), &create_req.obj)
                    .await
                    .map_err(|err| {
                        warn!("Create {} failed with error: {}", key, err);
                        kube_error_to_api(&err)
                    });
                KubeAPIResponse::CreateResponse(KubeCreateResponse { res })
            }
            KubeAPIRequest::UpdateRequest(update_req) => {
                let api = self.api_for(&update_req.namespace, &update_req.api_resource);
                let res = api
                    .replace(&update_req.name, &PostParams::default(), &update_req.obj)
                    .await
                    .map_err(|err| {
                        warn!("Update {} failed with error: {}", key, err);
                        kube_error_to_api(&err)
                    });
                KubeAPIResponse::UpdateResponse(KubeUpdateResponse { res })
            }
            KubeAPIRequest::UpdateStatusRequest(update_status_req) => {
                let api = self.api_for(&update_status_req.namespace, &update_status_req.api_resource);
                let res = match serde_json::to_vec(&update_status_req.obj) {
                    Err(err) => Err(APIError::Other(err.to_string())),
                    Ok(data) => api
                        .replace_status(&update_status_req.name, &PostParams::default(), data)
                        .await
                        .map_err(|err| {
                            warn!("UpdateStatus {} failed with error: {}", key, err);
                            kube_error_to_api(&err)
                        }),
                };
                KubeAPIResponse::UpdateStatusResponse(KubeUpdateStatusResponse { res })
            }
            KubeAPIRequest::DeleteRequest(delete_req) => {
                let api = self.api_for(&delete_req.namespace, &delete_req.api_resource);
                let res = api
                    .delete(&delete_req.name, &DeleteParams::default())
                    .await
                    .map(|_| ())
                    .map_err(|err| {
                        debug!("Delete {} failed with error: {}", key, err);
                        kube_error_to_api(&err)
                    });
                KubeAPIResponse::DeleteResponse(KubeDeleteResponse { res })
            }
        }
    }
}
