// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::executable_model::object_map::ObjectMap;
use crate::kubernetes_api_objects::api_method::Verb;
use crate::kubernetes_api_objects::error::APIError;

/// A request the executable API server has seen, kept for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub verb: Verb,
    pub kind: String,
    pub key: String,
}

/// An error the executable API server returns for the next matching request.
#[derive(Debug, Clone)]
pub struct InjectedFault {
    pub verb: Verb,
    pub kind: String,
    pub error: APIError,
}

// ApiServerState is the "state" of the executable API server model.
#[derive(Debug, Default)]
pub struct ApiServerState {
    pub resources: ObjectMap,
    pub uid_counter: i64,
    pub resource_version_counter: i64,
    pub requests: Vec<RequestRecord>,
    pub faults: Vec<InjectedFault>,
}

impl ApiServerState {
    pub fn new() -> ApiServerState {
        ApiServerState {
            resources: ObjectMap::new(),
            uid_counter: 0,
            resource_version_counter: 1,
            requests: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Removes and returns the first injected fault matching the request, if any.
    pub fn take_fault(&mut self, verb: Verb, kind: &str) -> Option<APIError> {
        let index = self
            .faults
            .iter()
            .position(|fault| fault.verb == verb && fault.kind == kind)?;
        Some(self.faults.remove(index).error)
    }
}
