//! The deployed capability set.
//!
//! The operator intercepts exactly two kinds: ConfigMaps and Secrets, the
//! objects its flow-collection pipeline mounts certificates and
//! configuration from. Fetches go through [`Api::get`]; watches constrain
//! the server-side stream to a single object with a `metadata.name` field
//! selector, so one watch never observes more than the object it was
//! opened for.

use std::fmt::Debug;
use std::sync::Arc;

use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::core::ErrorResponse;
use kube::runtime::watcher;
use serde::de::DeserializeOwned;

use super::capability::{Capability, FetchFuture, WatchFuture};
use super::error::FetchError;
use super::event::ObjectEvent;
use super::object::{ApiObject, ErasedObject, ObjectKey, ResourceKind};

impl ApiObject for ConfigMap {
    fn resource_kind() -> ResourceKind {
        ResourceKind::of::<ConfigMap>()
    }
}

impl ApiObject for Secret {
    fn resource_kind() -> ResourceKind {
        ResourceKind::of::<Secret>()
    }
}

/// Capability for ConfigMaps.
///
/// Managed fields and binary payloads are stripped before caching; the
/// cache exists for mounted configuration, not for bulk data.
pub fn config_maps(client: kube::Client) -> Capability {
    capability_for::<ConfigMap>(client, |cm| {
        cm.metadata.managed_fields = None;
        cm.binary_data = None;
    })
}

/// Capability for Secrets.
///
/// Managed fields and the write-only `string_data` are stripped before
/// caching.
pub fn secrets(client: kube::Client) -> Capability {
    capability_for::<Secret>(client, |secret| {
        secret.metadata.managed_fields = None;
        secret.string_data = None;
    })
}

fn capability_for<K>(client: kube::Client, prune: fn(&mut K)) -> Capability
where
    K: ApiObject
        + kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + DeserializeOwned
        + Debug,
{
    let fetch = {
        let client = client.clone();
        move |key: &ObjectKey| -> FetchFuture {
            let api = scoped_api::<K>(&client, key);
            let name = key.name.clone();
            Box::pin(async move {
                match api.get(&name).await {
                    Ok(mut object) => {
                        prune(&mut object);
                        Ok(Box::new(object) as ErasedObject)
                    }
                    Err(error) => Err(classify(error)),
                }
            })
        }
    };

    let watch = move |key: &ObjectKey| -> WatchFuture {
        let api = scoped_api::<K>(&client, key);
        let name = key.name.clone();
        Box::pin(async move {
            let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
            let stream = watcher::watcher(api, config)
                .filter_map(move |result| {
                    future::ready(match result {
                        Ok(watcher::Event::Apply(mut object))
                        | Ok(watcher::Event::InitApply(mut object)) => {
                            prune(&mut object);
                            Some(ObjectEvent::Modified(Arc::new(object)))
                        }
                        Ok(watcher::Event::Delete(mut object)) => {
                            prune(&mut object);
                            Some(ObjectEvent::Deleted(Arc::new(object)))
                        }
                        Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                        Err(error) => {
                            warn!(message = "Watch stream error.", %error);
                            None
                        }
                    })
                })
                .boxed();
            Ok(stream)
        })
    };

    Capability::new(K::resource_kind(), fetch, watch)
}

fn scoped_api<K>(client: &kube::Client, key: &ObjectKey) -> Api<K>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    if key.namespace.is_empty() {
        Api::default_namespaced(client.clone())
    } else {
        Api::namespaced(client.clone(), &key.namespace)
    }
}

fn classify(error: kube::Error) -> FetchError {
    match error {
        kube::Error::Api(ErrorResponse { code: 404, .. }) => FetchError::NotFound,
        error => FetchError::Transient {
            source: Box::new(error),
        },
    }
}
