// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::api::DynamicObject;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct ObjectMapKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectMapKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> ObjectMapKey {
        ObjectMapKey {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// ObjectMap is the stored state of the executable API server: every object, by key.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    inner: BTreeMap<ObjectMapKey, DynamicObject>,
}

impl ObjectMap {
    pub fn new() -> ObjectMap {
        ObjectMap { inner: BTreeMap::new() }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn contains_key(&self, key: &ObjectMapKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &ObjectMapKey) -> Option<&DynamicObject> {
        self.inner.get(key)
    }

    pub fn insert(&mut self, key: ObjectMapKey, value: DynamicObject) -> Option<DynamicObject> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &ObjectMapKey) -> Option<DynamicObject> {
        self.inner.remove(key)
    }
}
