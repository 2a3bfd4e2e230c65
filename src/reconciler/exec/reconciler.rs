// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::api_method::*;

/// Reconciler is the interface a controller implements to be driven by the shim layer.
///
/// reconcile_core is a pure step function: it takes the custom resource, the response
/// to the request it issued last (if any) and its current local state, and returns the
/// next local state together with the next request to send to the API server.
/// The shim layer loops on reconcile_core until reconcile_done or reconcile_error holds.
pub trait Reconciler {
    // The custom resource type the controller reconciles.
    type K;
    // The local state threaded through one reconcile invocation.
    type S;

    fn reconcile_init_state() -> Self::S;
    fn reconcile_core(cr: &Self::K, resp_o: Option<KubeAPIResponse>, state: Self::S) -> (Self::S, Option<KubeAPIRequest>);
    fn reconcile_done(state: &Self::S) -> bool;
    fn reconcile_error(state: &Self::S) -> bool;
}
