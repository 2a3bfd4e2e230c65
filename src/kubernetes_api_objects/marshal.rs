// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api_objects::error::ParseDynamicObjectError;
use kube::api::{DynamicObject, Resource};
use kube::core::TypeMeta;
use serde::{de::DeserializeOwned, Serialize};

/// marshal "serializes" a typed Kubernetes object into a DynamicObject,
/// which is what requests carry to the API server.
pub fn marshal<K>(obj: &K) -> Result<DynamicObject, ParseDynamicObjectError>
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(TypeMeta {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
        });
    }
    Ok(dynamic)
}

/// unmarshal turns a DynamicObject back into the typed object, rejecting objects of another kind.
pub fn unmarshal<K>(obj: DynamicObject) -> Result<K, ParseDynamicObjectError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let mut obj = obj;
    let found_kind = obj.types.as_ref().map(|types| types.kind.clone());
    match found_kind {
        Some(found) if found != K::kind(&()) => {
            return Err(ParseDynamicObjectError::UnexpectedKind {
                expected: K::kind(&()).to_string(),
                found,
            });
        }
        Some(_) => {}
        // Typed objects refuse to deserialize without apiVersion and kind.
        None => {
            obj.types = Some(TypeMeta {
                api_version: K::api_version(&()).to_string(),
                kind: K::kind(&()).to_string(),
            });
        }
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
