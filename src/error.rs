use thiserror::Error;

/// Unified error type surfaced by every component of the daemon.
///
/// Each variant corresponds to one of the error kinds in the design: most are
/// retried by the forwarder supervisor loop, a few are fatal to the whole
/// process. See the module docs on [`crate::forwarder`] and
/// [`crate::reconciler`] for which is which.
#[derive(Debug, Error)]
pub enum Error {
    #[error("manifest invalid: {0}")]
    ConfigInvalid(String),

    #[error("cluster unreachable: {0}")]
    ClusterUnreachable(String),

    #[error("{kind} {namespace}/{name} not found")]
    TargetNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("no pod found for selector '{selector}' in {namespace}")]
    NoPodFound { namespace: String, selector: String },

    #[error("invalid port spec '{0}'")]
    PortSpecInvalid(String),

    #[error("service has no port named '{0}'")]
    PortNameUnknown(String),

    #[error("no container port resolves service port {0}")]
    ContainerPortUnresolved(i32),

    #[error("tunnel lost: {0}")]
    TunnelLost(String),

    #[error("failed to bind control socket: {0}")]
    SocketBindFailed(String),

    #[error("daemon is not ready")]
    NotReady,

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("manifest decode error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
