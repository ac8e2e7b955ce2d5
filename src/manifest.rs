use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// The kind of workload a [`Target`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TargetKind {
    Deployment,
    StatefulSet,
    Service,
}

impl TargetKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "Deployment" => Ok(Self::Deployment),
            "StatefulSet" => Ok(Self::StatefulSet),
            "Service" => Ok(Self::Service),
            other => Err(Error::ConfigInvalid(format!("unknown target type '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::Service => "Service",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declaratively specified forwarding request: one workload, one ordered
/// list of port specs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub kind: TargetKind,
    pub namespace: String,
    pub name: String,
    pub ports: Vec<String>,
}

impl Target {
    /// Canonical serialization used as the registry key: two targets collide
    /// iff this string is equal.
    pub fn identity(&self) -> String {
        format!(
            "{}:{}/{}({})",
            self.kind,
            self.namespace,
            self.name,
            self.ports.join(",")
        )
    }
}

/// An ordered set of [`Target`]s, deduplicated by identity key (later wins).
#[derive(Clone, Debug, Default)]
pub struct Manifest {
    targets: Vec<Target>,
}

impl Manifest {
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    fn from_specs(specs: Vec<TargetSpec>) -> Result<Self> {
        let mut by_key: BTreeMap<String, Target> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();

        for spec in specs {
            let target = spec.into_target()?;
            let key = target.identity();
            if !by_key.contains_key(&key) {
                order.push(key.clone());
            }
            by_key.insert(key, target);
        }

        let targets = order
            .into_iter()
            .map(|key| by_key.remove(&key).expect("key was just inserted"))
            .collect();

        Ok(Self { targets })
    }
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    targets: Vec<TargetSpec>,
}

#[derive(Debug, Deserialize)]
struct TargetSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ports: Vec<String>,
}

impl TargetSpec {
    fn into_target(self) -> Result<Target> {
        if self.namespace.is_empty() {
            return Err(Error::ConfigInvalid("target namespace is empty".into()));
        }
        if self.name.is_empty() {
            return Err(Error::ConfigInvalid("target name is empty".into()));
        }
        if self.ports.is_empty() {
            return Err(Error::ConfigInvalid(format!(
                "target {}/{} has no ports",
                self.namespace, self.name
            )));
        }
        Ok(Target {
            kind: TargetKind::parse(&self.kind)?,
            namespace: self.namespace,
            name: self.name,
            ports: self.ports,
        })
    }
}

/// Read `path`, decode it as YAML, and produce a [`Manifest`].
///
/// Unknown top-level fields are ignored; a missing `targets` key yields an
/// empty manifest. Malformed YAML or a target missing a required field fails
/// with [`Error::ConfigInvalid`].
pub fn load(path: &Path) -> Result<Manifest> {
    let bytes = std::fs::read(path)?;
    let file: ManifestFile = serde_yaml::from_slice(&bytes)
        .map_err(|e| Error::ConfigInvalid(format!("{}: {e}", path.display())))?;
    Manifest::from_specs(file.targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = br#"
targets:
  - type: Deployment
    namespace: my-ns
    name: my-app
    ports: ["8080", "9090:http"]
"#;
        let file: ManifestFile = serde_yaml::from_slice(yaml).unwrap();
        let manifest = Manifest::from_specs(file.targets).unwrap();
        assert_eq!(manifest.targets().len(), 1);
        assert_eq!(manifest.targets()[0].kind, TargetKind::Deployment);
    }

    #[test]
    fn missing_targets_key_is_empty() {
        let file: ManifestFile = serde_yaml::from_slice(b"other: true").unwrap();
        let manifest = Manifest::from_specs(file.targets).unwrap();
        assert!(manifest.targets().is_empty());
    }

    #[test]
    fn unknown_kind_rejected() {
        let yaml = br#"
targets:
  - type: Pod
    namespace: ns
    name: n
    ports: ["80"]
"#;
        let file: ManifestFile = serde_yaml::from_slice(yaml).unwrap();
        let err = Manifest::from_specs(file.targets).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn duplicate_identity_keys_last_wins() {
        let yaml = br#"
targets:
  - type: Service
    namespace: ns
    name: a
    ports: ["80"]
  - type: Service
    namespace: ns
    name: a
    ports: ["80"]
"#;
        let file: ManifestFile = serde_yaml::from_slice(yaml).unwrap();
        let manifest = Manifest::from_specs(file.targets).unwrap();
        assert_eq!(manifest.targets().len(), 1);
    }

    #[test]
    fn identity_is_stable_under_field_permutation() {
        let a = Target {
            kind: TargetKind::Service,
            namespace: "ns".into(),
            name: "svc".into(),
            ports: vec!["80".into()],
        };
        let b = Target {
            namespace: "ns".into(),
            name: "svc".into(),
            kind: TargetKind::Service,
            ports: vec!["80".into()],
        };
        assert_eq!(a.identity(), b.identity());

        let c = Target {
            ports: vec!["81".into()],
            ..a.clone()
        };
        assert_ne!(a.identity(), c.identity());
    }
}
