pub mod cli;
pub mod client;
pub mod control;
pub mod error;
pub mod forwarder;
pub mod kube_client;
pub mod logging;
pub mod manifest;
pub mod pod_select;
pub mod reconciler;
pub mod registry;
pub mod supervisor;
pub mod translate;
pub mod unix_socket;
