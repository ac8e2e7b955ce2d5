use std::path::Path;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::error::{Error, Result};
use crate::manifest::{Target, TargetKind};

/// Build a fresh Kubernetes REST client from the given kubeconfig path. A new
/// client is constructed per forwarder attempt so the daemon tolerates
/// transient configuration drift (a refreshed token, a rewritten file).
pub async fn build_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::ClusterUnreachable(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::ClusterUnreachable(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::ClusterUnreachable(e.to_string()))?,
    };
    Client::try_from(config).map_err(|e| Error::ClusterUnreachable(e.to_string()).into())
}

/// The subset of a fetched target object the forwarder needs: its label
/// selector, and (for Service targets) the Service itself for port
/// translation.
pub struct SelectedTarget {
    pub selector: String,
    pub service: Option<Service>,
}

/// Fetch the target object by kind/namespace/name and derive its label
/// selector per the canonical "selectors for object" rule: Deployment and
/// StatefulSet selectors come from `spec.selector`, Service selectors from
/// `spec.selector`.
pub async fn fetch_selector(client: &Client, target: &Target) -> Result<SelectedTarget> {
    let ns = target.namespace.as_str();
    match target.kind {
        TargetKind::Deployment => {
            let api: Api<Deployment> = Api::namespaced(client.clone(), ns);
            let obj = api.get(&target.name).await.map_err(|e| not_found_or(target, e))?;
            let selector = obj
                .spec
                .and_then(|s| s.selector.match_labels)
                .map(label_selector_string)
                .ok_or_else(|| Error::NoPodFound {
                    namespace: target.namespace.clone(),
                    selector: String::new(),
                })?;
            Ok(SelectedTarget { selector, service: None })
        }
        TargetKind::StatefulSet => {
            let api: Api<StatefulSet> = Api::namespaced(client.clone(), ns);
            let obj = api.get(&target.name).await.map_err(|e| not_found_or(target, e))?;
            let selector = obj
                .spec
                .and_then(|s| s.selector.match_labels)
                .map(label_selector_string)
                .ok_or_else(|| Error::NoPodFound {
                    namespace: target.namespace.clone(),
                    selector: String::new(),
                })?;
            Ok(SelectedTarget { selector, service: None })
        }
        TargetKind::Service => {
            let api: Api<Service> = Api::namespaced(client.clone(), ns);
            let obj = api.get(&target.name).await.map_err(|e| not_found_or(target, e))?;
            let selector = obj
                .spec
                .as_ref()
                .and_then(|s| s.selector.clone())
                .map(label_selector_string)
                .ok_or_else(|| Error::NoPodFound {
                    namespace: target.namespace.clone(),
                    selector: String::new(),
                })?;
            Ok(SelectedTarget { selector, service: Some(obj) })
        }
    }
}

fn label_selector_string(labels: std::collections::BTreeMap<String, String>) -> String {
    labels.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn not_found_or(target: &Target, e: kube::Error) -> Error {
    if let kube::Error::Api(resp) = &e {
        if resp.code == 404 {
            return Error::TargetNotFound {
                kind: target.kind.to_string(),
                namespace: target.namespace.clone(),
                name: target.name.clone(),
            };
        }
    }
    Error::Kube(e)
}
