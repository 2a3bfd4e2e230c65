// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::Error;
use futures::{Stream, StreamExt};
use kube::{
    api::Api,
    runtime::{
        reflector::{store::Writer, ObjectRef, Store},
        watcher::{self, watcher},
        WatchStreamExt,
    },
    Client, Resource,
};
use kube_core::NamespaceResourceScope;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A change notification for one object of the watched kind.
/// Deletions only update the local mirror and are not forwarded.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(Arc<K>),
    Updated(Arc<K>),
}

impl<K> WatchEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Added(obj) | WatchEvent::Updated(obj) => obj,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchCacheConfig {
    /// Watch a single namespace instead of the whole cluster.
    pub namespace: Option<String>,
    /// Must be non-zero.
    pub resync_interval: Duration,
    /// Consecutive watch failures tolerated before the cache gives up.
    pub max_retries: usize,
}

impl Default for WatchCacheConfig {
    fn default() -> Self {
        WatchCacheConfig {
            namespace: None,
            resync_interval: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

/// WatchCache keeps a local mirror of one kind of object and forwards
/// additions and updates to a consumer. Every resync interval the whole mirror
/// is re-delivered as updates, so a consumer that missed a notification catches up.
pub struct WatchCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    config: WatchCacheConfig,
    writer: Writer<K>,
    store: Store<K>,
}

impl<K> WatchCache<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(config: WatchCacheConfig) -> WatchCache<K> {
        let writer = Writer::default();
        let store = writer.as_reader();
        WatchCache { config, writer, store }
    }

    /// A read handle on the mirror.
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    pub async fn run(self, client: Client, tx: mpsc::Sender<WatchEvent<K>>, shutdown: CancellationToken) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        let api: Api<K> = match &self.config.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        };
        let stream = watcher(api, watcher::Config::default()).default_backoff();
        self.run_stream(stream, tx, shutdown).await
    }

    /// Drives the cache from any stream of watch events until the stream ends,
    /// the consumer goes away, or shutdown is requested.
    pub async fn run_stream<S>(
        mut self,
        stream: S,
        tx: mpsc::Sender<WatchEvent<K>>,
        shutdown: CancellationToken,
    ) -> Result<(), Error>
    where
        S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send,
    {
        let kind = K::kind(&()).to_string();
        let mut stream = std::pin::pin!(stream);
        let period = self.config.resync_interval;
        let mut resync = interval_at(Instant::now() + period, period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0;
        info!("Watching {}", kind);
        loop {
            let notifications = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Watch of {} stopped", kind);
                    return Ok(());
                }
                _ = resync.tick() => {
                    let objects = self.store.state();
                    debug!("Resyncing {} {} objects", objects.len(), kind);
                    objects.into_iter().map(WatchEvent::Updated).collect::<Vec<_>>()
                }
                next = stream.next() => match next {
                    None => {
                        info!("Watch stream of {} ended", kind);
                        return Ok(());
                    }
                    Some(Err(err)) => {
                        consecutive_failures += 1;
                        if consecutive_failures > self.config.max_retries {
                            error!("Watch of {} failed {} times in a row: {}", kind, consecutive_failures, err);
                            return Err(Error::WatchRetriesExhausted {
                                retries: consecutive_failures,
                                source: err,
                            });
                        }
                        warn!("Watch of {} failed ({}/{}): {}", kind, consecutive_failures, self.config.max_retries, err);
                        Vec::new()
                    }
                    Some(Ok(event)) => {
                        consecutive_failures = 0;
                        self.apply(event)
                    }
                }
            };
            for notification in notifications {
                if !Self::send(&tx, notification, &shutdown).await {
                    info!("Consumer of {} notifications is gone", kind);
                    return Ok(());
                }
            }
        }
    }

    // Applies the event to the mirror and returns the notifications it produces.
    fn apply(&mut self, event: watcher::Event<K>) -> Vec<WatchEvent<K>> {
        let touched: Vec<(ObjectRef<K>, bool)> = match &event {
            watcher::Event::Applied(obj) => vec![self.classify(obj)],
            watcher::Event::Deleted(_) => Vec::new(),
            watcher::Event::Restarted(objs) => objs.iter().map(|obj| self.classify(obj)).collect(),
        };
        self.writer.apply_watcher_event(&event);
        touched
            .into_iter()
            .filter_map(|(obj_ref, is_new)| {
                let obj = self.store.get(&obj_ref)?;
                Some(if is_new {
                    WatchEvent::Added(obj)
                } else {
                    WatchEvent::Updated(obj)
                })
            })
            .collect()
    }

    fn classify(&self, obj: &K) -> (ObjectRef<K>, bool) {
        let obj_ref = ObjectRef::from_obj(obj);
        let is_new = self.store.get(&obj_ref).is_none();
        (obj_ref, is_new)
    }

    async fn send(tx: &mpsc::Sender<WatchEvent<K>>, notification: WatchEvent<K>, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            _ = shutdown.cancelled() => false,
            res = tx.send(notification) => res.is_ok(),
        }
    }
}
