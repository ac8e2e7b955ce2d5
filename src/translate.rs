use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::error::{Error, Result};

/// Convert service-port specs into the `local[:remote]` strings the
/// port-forward session expects, resolving named service ports against the
/// backing pod's container ports.
///
/// Non-Service targets never call this: their ports are forwarded verbatim.
pub fn translate(ports: &[String], service: &Service, pod: &Pod) -> Result<Vec<String>> {
    ports.iter().map(|spec| translate_one(spec, service, pod)).collect()
}

fn translate_one(spec: &str, service: &Service, pod: &Pod) -> Result<String> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (mut local, mut remote) = match parts.as_slice() {
        [one] => (one.to_string(), one.to_string()),
        [l, r] => (l.to_string(), r.to_string()),
        _ => return Err(Error::PortSpecInvalid(spec.to_string())),
    };

    let same_before_lookup = local == remote;

    let remote_number: i32 = match remote.parse() {
        Ok(n) => n,
        Err(_) => {
            let resolved = lookup_named_service_port(service, &remote)?;
            if same_before_lookup {
                local = resolved.to_string();
            }
            remote = resolved.to_string();
            resolved
        }
    };

    let container_port = lookup_container_port(service, pod, remote_number)?;

    if local == container_port.to_string() {
        Ok(container_port.to_string())
    } else {
        Ok(format!("{local}:{container_port}"))
    }
}

fn lookup_named_service_port(service: &Service, name: &str) -> Result<i32> {
    let ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .ok_or_else(|| Error::PortNameUnknown(name.to_string()))?;

    ports
        .iter()
        .find(|p| p.name.as_deref() == Some(name))
        .map(|p| p.port)
        .ok_or_else(|| Error::PortNameUnknown(name.to_string()))
}

/// Look up the container port on `pod` that backs `service`'s target port
/// for service port number `remote_number`.
fn lookup_container_port(service: &Service, pod: &Pod, remote_number: i32) -> Result<i32> {
    let svc_ports = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .ok_or(Error::ContainerPortUnresolved(remote_number))?;

    let svc_port = svc_ports
        .iter()
        .find(|p| p.port == remote_number)
        .ok_or(Error::ContainerPortUnresolved(remote_number))?;

    match svc_port.target_port.as_ref() {
        Some(IntOrString::Int(n)) => Ok(*n),
        Some(IntOrString::String(name)) => pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.ports.as_ref())
            .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(name)))
            .map(|p| p.container_port)
            .ok_or(Error::ContainerPortUnresolved(remote_number)),
        None => Ok(remote_number),
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, ServicePort, ServiceSpec};

    use super::*;

    fn service_with_http_8080() -> Service {
        Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: Some("http".into()),
                    port: 8080,
                    target_port: Some(IntOrString::String("http".into())),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn pod_with_http_container_port(container_port: i32) -> Pod {
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    ports: Some(vec![ContainerPort {
                        name: Some("http".into()),
                        container_port,
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn named_remote_port_translates_to_container_port() {
        let service = service_with_http_8080();
        let pod = pod_with_http_container_port(8080);
        let out = translate(&["9090:http".to_string()], &service, &pod).unwrap();
        assert_eq!(out, vec!["9090:8080".to_string()]);
    }

    #[test]
    fn bare_named_port_adopts_resolved_number_on_both_sides() {
        let service = service_with_http_8080();
        let pod = pod_with_http_container_port(8080);
        let out = translate(&["http".to_string()], &service, &pod).unwrap();
        assert_eq!(out, vec!["8080".to_string()]);
    }

    #[test]
    fn numeric_spec_with_distinct_container_port_keeps_local() {
        let service = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    port: 80,
                    target_port: Some(IntOrString::Int(8080)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let pod = Pod::default();
        let out = translate(&["80".to_string()], &service, &pod).unwrap();
        assert_eq!(out, vec!["80:8080".to_string()]);
    }

    #[test]
    fn unknown_named_port_fails() {
        let service = service_with_http_8080();
        let pod = pod_with_http_container_port(8080);
        let err = translate(&["9090:grpc".to_string()], &service, &pod).unwrap_err();
        assert!(matches!(err, Error::PortNameUnknown(_)));
    }

    #[test]
    fn malformed_spec_fails() {
        let service = service_with_http_8080();
        let pod = pod_with_http_container_port(8080);
        let err = translate(&["1:2:3".to_string()], &service, &pod).unwrap_err();
        assert!(matches!(err, Error::PortSpecInvalid(_)));
    }

    #[test]
    fn translation_is_idempotent_under_stable_service_and_pod() {
        let service = service_with_http_8080();
        let pod = pod_with_http_container_port(8080);
        let spec = vec!["9090:http".to_string()];
        let once = translate(&spec, &service, &pod).unwrap();
        let twice = translate(&spec, &service, &pod).unwrap();
        assert_eq!(once, twice);
    }
}
