use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::forwarder::Forwarder;
use crate::manifest;
use crate::registry::{self, ForwarderStatus, Registry};

/// Owns the forwarder registry and keeps it in sync with the manifest file.
pub struct Reconciler {
    manifest_path: PathBuf,
    kubeconfig: Option<PathBuf>,
    registry: RwLock<Registry>,
}

impl Reconciler {
    pub fn new(manifest_path: PathBuf, kubeconfig: Option<PathBuf>) -> Self {
        Self {
            manifest_path,
            kubeconfig,
            registry: RwLock::new(Registry::new()),
        }
    }

    /// Read-locked snapshot of every registered forwarder, sorted by
    /// identity key ascending.
    pub async fn status(&self) -> Vec<ForwarderStatus> {
        let registry = self.registry.read().await;
        registry::snapshot(&registry)
    }

    /// Run the initial reconcile, then react to manifest file-change events
    /// until cancelled. On cancellation, every forwarder is stopped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.reconcile().await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let basename = self
            .manifest_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        let watch_dir = self
            .manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher: RecommendedWatcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            })
            .map_err(|e| anyhow::anyhow!(e))?;
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow::anyhow!(e))?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop_all().await;
                    return Ok(());
                }
                event = rx.recv() => {
                    let Some(event) = event else { return Ok(()); };
                    if !event.paths.iter().any(|p| p.file_name() == Some(basename.as_os_str())) {
                        continue;
                    }
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "manifest reload failed, keeping current registry");
                    }
                }
            }
        }
    }

    /// Diff the manifest against the registry: stops precede starts, so a
    /// turned-over identity key never overlaps. Serialized under the
    /// registry's write lock. A manifest load failure is logged and the
    /// current registry is left untouched (see design notes on the reload
    /// failure policy).
    pub async fn reconcile(&self) -> Result<()> {
        let loaded = manifest::load(&self.manifest_path);
        let manifest = match loaded {
            Ok(m) => m,
            Err(e) => {
                error!(error = %e, "failed to load manifest");
                return Err(e);
            }
        };

        let mut registry = self.registry.write().await;

        let wanted: std::collections::BTreeSet<String> =
            manifest.targets().iter().map(|t| t.identity()).collect();

        let stale: Vec<String> =
            registry.keys().filter(|k| !wanted.contains(*k)).cloned().collect();
        for key in stale {
            if let Some(forwarder) = registry.remove(&key) {
                info!(key = %key, "stopping forwarder for removed target");
                forwarder.stop();
            }
        }

        for target in manifest.targets() {
            let key = target.identity();
            if registry.contains_key(&key) {
                continue;
            }
            info!(key = %key, "starting forwarder for new target");
            let forwarder = Arc::new(Forwarder::new(target.clone(), self.kubeconfig.clone()));
            forwarder.start();
            registry.insert(key, forwarder);
        }

        Ok(())
    }

    async fn stop_all(&self) {
        let mut registry = self.registry.write().await;
        for (_, forwarder) in registry.iter() {
            forwarder.stop();
        }
        registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_manifest(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn reconcile_populates_registry_from_manifest() {
        let file = write_manifest(
            r#"
targets:
  - type: Deployment
    namespace: ns
    name: a
    ports: ["8080"]
"#,
        );
        let reconciler = Reconciler::new(file.path().to_path_buf(), None);
        reconciler.reconcile().await.unwrap();
        let status = reconciler.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "a");
    }

    #[tokio::test]
    async fn reconcile_removes_stale_entries() {
        let file = write_manifest(
            r#"
targets:
  - type: Deployment
    namespace: ns
    name: a
    ports: ["8080"]
  - type: Deployment
    namespace: ns
    name: b
    ports: ["8081"]
"#,
        );
        let reconciler = Reconciler::new(file.path().to_path_buf(), None);
        reconciler.reconcile().await.unwrap();
        assert_eq!(reconciler.status().await.len(), 2);

        std::fs::write(
            file.path(),
            r#"
targets:
  - type: Deployment
    namespace: ns
    name: a
    ports: ["8080"]
"#,
        )
        .unwrap();

        reconciler.reconcile().await.unwrap();
        let status = reconciler.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].name, "a");
    }

    #[tokio::test]
    async fn empty_manifest_yields_empty_registry() {
        let file = write_manifest("targets: []\n");
        let reconciler = Reconciler::new(file.path().to_path_buf(), None);
        reconciler.reconcile().await.unwrap();
        assert!(reconciler.status().await.is_empty());
    }

    #[tokio::test]
    async fn broken_reload_preserves_registry() {
        let file = write_manifest(
            r#"
targets:
  - type: Deployment
    namespace: ns
    name: a
    ports: ["8080"]
"#,
        );
        let reconciler = Reconciler::new(file.path().to_path_buf(), None);
        reconciler.reconcile().await.unwrap();

        std::fs::write(&reconciler.manifest_path, "not: [valid yaml").unwrap();
        assert!(reconciler.reconcile().await.is_err());

        let status = reconciler.status().await;
        assert_eq!(status.len(), 1, "registry must survive a broken reload");
    }
}
