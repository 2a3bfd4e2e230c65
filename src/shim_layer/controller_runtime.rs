// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::Error;
use crate::kubernetes_api_objects::{api_method::*, error::APIError, marshal::unmarshal};
use crate::reconciler::exec::reconciler::Reconciler;
use crate::shim_layer::api_server::ApiServer;
use core::fmt::Debug;
use futures::{Stream, StreamExt};
use kube::{
    api::Resource,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
};
use kube_core::NamespaceResourceScope;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const ERROR_REQUEUE_DELAY: Duration = Duration::from_secs(10);

// The shim layer connects the reconcile_core state machine to kube-rs.
// kube-rs needs a reconcile function (impl FnMut(Arc<K>, Arc<Ctx>) -> ReconcilerFut)
// to run a controller; reconcile_with builds one on top of reconcile_core.

// Data is passed to reconcile_with by kube-rs.
pub struct Data {
    pub api: Arc<dyn ApiServer>,
    // How long a successfully reconciled object waits before it is reconciled again.
    pub requeue_after: Duration,
}

// run_controller runs a controller built by the caller (who decides which owned
// resources also trigger reconciles) until shutdown is requested, or until the
// controller's watches fail more than max_watch_retries times in a row. It requires:
// K: the custom resource type
// ReconcilerType: the reconciler type
pub async fn run_controller<K, ReconcilerType>(
    controller: Controller<K>,
    data: Data,
    max_watch_retries: usize,
    shutdown: CancellationToken,
) -> Result<(), Error>
where
    K: Clone + Resource<DynamicType = (), Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
    ReconcilerType: Reconciler<K = K> + Send + Sync + 'static,
    ReconcilerType::S: Send,
{
    let reconcile =
        |cr: Arc<K>, ctx: Arc<Data>| async move { reconcile_with::<K, ReconcilerType>(cr, ctx).await };

    info!("Starting {} controller", K::kind(&()));
    let results = controller
        .graceful_shutdown_on(async move { shutdown.cancelled().await })
        .run(reconcile, error_policy, Arc::new(data));
    let res = consume_controller_results(results, max_watch_retries).await;
    info!("{} controller terminated", K::kind(&()));
    res
}

// consume_controller_results drains the results the controller yields.
// Reconcile failures are logged here and requeued by error_policy.
// Watch failures count towards max_watch_retries; any successful reconcile resets the count.
pub async fn consume_controller_results<K, S>(results: S, max_watch_retries: usize) -> Result<(), Error>
where
    K: Resource<DynamicType = ()>,
    S: Stream<Item = Result<(ObjectRef<K>, Action), controller::Error<Error, watcher::Error>>>,
{
    let mut results = std::pin::pin!(results);
    let mut consecutive_failures = 0;
    while let Some(res) = results.next().await {
        match res {
            Ok((obj_ref, _)) => {
                consecutive_failures = 0;
                debug!("Reconciled {}", obj_ref);
            }
            Err(controller::Error::QueueError(err)) => {
                consecutive_failures += 1;
                if consecutive_failures > max_watch_retries {
                    error!("Watches of {} failed {} times in a row: {}", K::kind(&()), consecutive_failures, err);
                    return Err(Error::WatchRetriesExhausted {
                        retries: consecutive_failures,
                        source: err,
                    });
                }
                warn!("Watch of {} failed ({}/{}): {}", K::kind(&()), consecutive_failures, max_watch_retries, err);
            }
            Err(err) => warn!("Reconcile failed: {}", err),
        }
    }
    Ok(())
}

// reconcile_with is invoked by kube-rs whenever the watched objects change.
// It starts from ReconcilerType::reconcile_init_state and calls ReconcilerType::reconcile_core in a loop,
// sending every request reconcile_core issues to the API server and handing the response back,
// until the reconciler reports it is done (reconcile_done) or failed (reconcile_error).
pub async fn reconcile_with<K, ReconcilerType>(cr: Arc<K>, ctx: Arc<Data>) -> Result<Action, Error>
where
    K: Clone + Resource<DynamicType = (), Scope = NamespaceResourceScope> + DeserializeOwned + Serialize + Debug,
    ReconcilerType: Reconciler<K = K>,
{
    let cr_name = cr.meta().name.as_ref().ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let cr_namespace = cr
        .meta()
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let cr_key = format!("{}/{}/{}", K::kind(&()), cr_namespace, cr_name);
    let log_header = format!("Reconciling {}:", cr_key);

    // Get the custom resource by a quorum read so reconcile_core starts from the latest version.
    let get_cr_req = KubeAPIRequest::GetRequest(KubeGetRequest::of::<K>(cr_namespace, cr_name));
    let cr = match ctx.api.handle(get_cr_req).await {
        KubeAPIResponse::GetResponse(KubeGetResponse { res: Ok(obj) }) => {
            unmarshal::<K>(obj).map_err(|err| Error::ShimLayerError(err.to_string()))?
        }
        KubeAPIResponse::GetResponse(KubeGetResponse {
            res: Err(APIError::ObjectNotFound),
        }) => {
            info!("{} custom resource not found, end reconcile", log_header);
            return Ok(Action::await_change());
        }
        KubeAPIResponse::GetResponse(KubeGetResponse { res: Err(err) }) => {
            warn!("{} get custom resource failed with error: {}, will retry reconcile", log_header, err);
            return Ok(Action::requeue(ERROR_REQUEUE_DELAY));
        }
        _ => return Err(Error::ShimLayerError(format!("unexpected response to get {}", cr_key))),
    };

    let mut state = ReconcilerType::reconcile_init_state();
    let mut resp_option: Option<KubeAPIResponse> = None;
    loop {
        if ReconcilerType::reconcile_done(&state) {
            debug!("{} done", log_header);
            break;
        }
        if ReconcilerType::reconcile_error(&state) {
            warn!("{} error", log_header);
            return Err(Error::ReconcileCoreError(cr_key));
        }
        let (state_prime, request_option) = ReconcilerType::reconcile_core(&cr, resp_option, state);
        resp_option = match request_option {
            Some(req) => {
                let req_key = req.key();
                let verb = req.verb();
                let resp = ctx.api.handle(req).await;
                match resp.err() {
                    Some(err) => info!("{} {:?} {} failed with error: {}", log_header, verb, req_key, err),
                    None => debug!("{} {:?} {} succeeded", log_header, verb, req_key),
                }
                Some(resp)
            }
            None => None,
        };
        state = state_prime;
    }
    Ok(Action::requeue(ctx.requeue_after))
}

// error_policy defines the controller's behavior when the reconcile ends with an error.
pub fn error_policy<K>(_object: Arc<K>, error: &Error, _ctx: Arc<Data>) -> Action {
    warn!("Reconcile failed due to error: {}", error);
    Action::requeue(ERROR_REQUEUE_DELAY)
}
