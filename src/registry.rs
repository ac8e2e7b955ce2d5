use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::forwarder::Forwarder;
use crate::manifest::Target;

/// Mapping from identity key to the [`Forwarder`] that owns it. Mutated only
/// by the reconciler under its write lock; read by `status()` under the read
/// lock.
pub type Registry = BTreeMap<String, Arc<Forwarder>>;

/// A point-in-time snapshot of one forwarder, as exposed through the control
/// API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForwarderStatus {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub ports: Vec<String>,
    pub forwarding: bool,
}

impl ForwarderStatus {
    pub fn of(target: &Target, forwarding: bool) -> Self {
        Self {
            kind: target.kind.to_string(),
            namespace: target.namespace.clone(),
            name: target.name.clone(),
            ports: target.ports.clone(),
            forwarding,
        }
    }
}

/// Snapshot every entry, sorted by identity key ascending (the `BTreeMap`
/// iteration order already guarantees this).
pub fn snapshot(registry: &Registry) -> Vec<ForwarderStatus> {
    registry
        .values()
        .map(|f| ForwarderStatus::of(f.target(), f.forwarding()))
        .collect()
}
