use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::kube_client::{build_client, fetch_selector};
use crate::manifest::{Target, TargetKind};
use crate::{pod_select, translate};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const POD_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervises exactly one [`Target`]: selects a backing pod, opens a
/// port-forward session, and restarts with exponential backoff on any
/// failure. Owned by the reconciler; referenced from nowhere else.
pub struct Forwarder {
    target: Target,
    kubeconfig: Option<std::path::PathBuf>,
    forwarding: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl Forwarder {
    pub fn new(target: Target, kubeconfig: Option<std::path::PathBuf>) -> Self {
        Self {
            target,
            kubeconfig,
            forwarding: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn forwarding(&self) -> bool {
        self.forwarding.load(Ordering::SeqCst)
    }

    /// Spawn the supervisor loop. Non-blocking.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.supervise().await });
    }

    /// Idempotent: cancels the supervisor loop and tears down any in-flight
    /// session. Valid even if `start` was never called.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn supervise(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;
        let name = format!("{}/{}", self.target.namespace, self.target.name);

        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            match self.attempt().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    error!(target = %name, error = %e, "forward attempt failed");
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// One cycle of §4.3's supervisor loop: select pod, translate ports,
    /// open the session, and block until it terminates.
    async fn attempt(&self) -> Result<()> {
        let client = build_client(self.kubeconfig.as_deref()).await?;
        let selected = fetch_selector(&client, &self.target).await?;

        let pod_api: Api<Pod> = Api::namespaced(client.clone(), &self.target.namespace);
        let pods = tokio::time::timeout(
            POD_POLL_TIMEOUT,
            pod_api.list(&ListParams::default().labels(&selected.selector)),
        )
        .await
        .map_err(|_| Error::NoPodFound {
            namespace: self.target.namespace.clone(),
            selector: selected.selector.clone(),
        })??;

        let pod = pod_select::pick(&pods.items).ok_or_else(|| Error::NoPodFound {
            namespace: self.target.namespace.clone(),
            selector: selected.selector.clone(),
        })?;
        let pod_name = pod.metadata.name.clone().ok_or_else(|| Error::NoPodFound {
            namespace: self.target.namespace.clone(),
            selector: selected.selector.clone(),
        })?;

        let ports = match (self.target.kind, &selected.service) {
            (TargetKind::Service, Some(service)) => translate::translate(&self.target.ports, service, pod)?,
            _ => self.target.ports.clone(),
        };

        info!(pod = %pod_name, ports = ?ports, "opening port-forward");
        self.run_session(pod_api, pod_name, ports).await
    }

    /// Bind a local TCP listener per port, proxy accepted connections onto a
    /// fresh SPDY port-forward stream per connection, and block until
    /// cancelled or a tunnel failure is observed.
    async fn run_session(&self, pod_api: Api<Pod>, pod_name: String, ports: Vec<String>) -> Result<()> {
        let (broken_tx, mut broken_rx) = watch::channel(false);
        let session_cancel = CancellationToken::new();
        let mut listeners = Vec::new();

        for spec in &ports {
            let (local, remote) = split_port_spec(spec)?;
            let listener = TcpListener::bind(("127.0.0.1", local))
                .await
                .map_err(|e| Error::TunnelLost(format!("bind 127.0.0.1:{local}: {e}")))?;
            listeners.push(tokio::spawn(listen_loop(
                listener,
                pod_api.clone(),
                pod_name.clone(),
                remote,
                broken_tx.clone(),
                session_cancel.clone(),
            )));
        }

        self.forwarding.store(true, Ordering::SeqCst);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Ok(()),
            changed = broken_rx.changed() => {
                let _ = changed;
                Err(Error::TunnelLost(format!("{pod_name} connection lost")))
            }
        };
        self.forwarding.store(false, Ordering::SeqCst);

        session_cancel.cancel();
        for handle in listeners {
            handle.abort();
        }
        result
    }
}

fn split_port_spec(spec: &str) -> Result<(u16, u16)> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (local, remote) = match parts.as_slice() {
        [one] => (*one, *one),
        [l, r] => (*l, *r),
        _ => return Err(Error::PortSpecInvalid(spec.to_string())),
    };
    let local: u16 = local.parse().map_err(|_| Error::PortSpecInvalid(spec.to_string()))?;
    let remote: u16 = remote.parse().map_err(|_| Error::PortSpecInvalid(spec.to_string()))?;
    Ok((local, remote))
}

async fn listen_loop(
    listener: TcpListener, pod_api: Api<Pod>, pod_name: String, remote_port: u16,
    broken_tx: watch::Sender<bool>, cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, pod = %pod_name, port = remote_port, "accepted connection");
                        tokio::spawn(proxy_connection(
                            stream,
                            pod_api.clone(),
                            pod_name.clone(),
                            remote_port,
                            broken_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        let _ = broken_tx.send(true);
                        return;
                    }
                }
            }
        }
    }
}

async fn proxy_connection(
    mut local: tokio::net::TcpStream, pod_api: Api<Pod>, pod_name: String, remote_port: u16,
    broken_tx: watch::Sender<bool>,
) {
    let mut forward = match pod_api.portforward(&pod_name, &[remote_port]).await {
        Ok(f) => f,
        Err(e) => {
            error!(pod = %pod_name, port = remote_port, error = %e, "failed to open port-forward stream");
            let _ = broken_tx.send(true);
            return;
        }
    };
    let Some(mut upstream) = forward.take_stream(remote_port) else {
        error!(pod = %pod_name, port = remote_port, "port-forward stream missing");
        let _ = broken_tx.send(true);
        return;
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut local, &mut upstream).await {
        debug!(pod = %pod_name, port = remote_port, error = %e, "connection ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_port_spec_handles_both_forms() {
        assert_eq!(split_port_spec("8080").unwrap(), (8080, 8080));
        assert_eq!(split_port_spec("8080:80").unwrap(), (8080, 80));
        assert!(split_port_spec("1:2:3").is_err());
        assert!(split_port_spec("abc").is_err());
    }

    #[test]
    fn forwarder_starts_not_forwarding() {
        let target = Target {
            kind: TargetKind::Deployment,
            namespace: "ns".into(),
            name: "app".into(),
            ports: vec!["8080".into()],
        };
        let f = Forwarder::new(target, None);
        assert!(!f.forwarding());
    }

    #[test]
    fn stop_is_idempotent_on_unstarted_forwarder() {
        let target = Target {
            kind: TargetKind::Deployment,
            namespace: "ns".into(),
            name: "app".into(),
            ports: vec!["8080".into()],
        };
        let f = Forwarder::new(target, None);
        f.stop();
        f.stop();
    }
}
