//! Kubernetes configuration parsing
//!
//! Parses kubeconfig files (typically ~/.kube/config) into clusters, users,
//! contexts and the active context name. Only structure is checked here;
//! references between entries are resolved in [`super::auth`].

use std::collections::HashSet;

use serde::Deserialize;
use serde_yaml_ng::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("kubeconfig document is not a mapping")]
    NotAMapping,
    #[error("invalid YAML: {0}")]
    Yaml(serde_yaml_ng::Error),
    #[error("malformed kubeconfig: {0}")]
    Invalid(serde_yaml_ng::Error),
}

/// Connection details of a cluster
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterInfo {
    pub server: String,
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub certificate_authority: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

/// Credentials of a user; only the fields of the chosen auth method are set
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserInfo {
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Pairing of a cluster and a user
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextInfo {
    pub cluster: String,
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextInfo,
}

/// Parsed kubeconfig
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(default, rename = "apiVersion")]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: String,
}

impl KubeConfig {
    /// Parse kubeconfig YAML content
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        let value: Value = serde_yaml_ng::from_str(content).map_err(ParseError::Yaml)?;
        Self::from_value(value)
    }

    /// Build a config from an already decoded YAML document
    pub fn from_value(value: Value) -> Result<Self, ParseError> {
        if !value.is_mapping() {
            return Err(ParseError::NotAMapping);
        }
        let config: Self = serde_yaml_ng::from_value(value).map_err(ParseError::Invalid)?;
        config.warn_duplicates();
        Ok(config)
    }

    /// Get the current context
    pub fn current_context(&self) -> Option<&NamedContext> {
        self.context(&self.current_context)
    }

    /// Get a context by name. The first entry wins when names repeat.
    pub fn context(&self, name: &str) -> Option<&NamedContext> {
        self.contexts.iter().find(|c| c.name == name)
    }

    /// Get a cluster by name. The first entry wins when names repeat.
    pub fn cluster(&self, name: &str) -> Option<&NamedCluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    /// Get a user by name. The first entry wins when names repeat.
    pub fn user(&self, name: &str) -> Option<&NamedUser> {
        self.users.iter().find(|u| u.name == name)
    }

    fn warn_duplicates(&self) {
        warn_duplicate_names("cluster", self.clusters.iter().map(|c| c.name.as_str()));
        warn_duplicate_names("user", self.users.iter().map(|u| u.name.as_str()));
        warn_duplicate_names("context", self.contexts.iter().map(|c| c.name.as_str()));
    }
}

fn warn_duplicate_names<'a>(kind: &str, names: impl Iterator<Item = &'a str>) {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            tracing::warn!("duplicate {} name {:?} in kubeconfig, using the first entry", kind, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: Config
current-context: minikube
clusters:
- name: minikube
  cluster:
    server: https://192.168.49.2:8443
    certificate-authority: /home/user/.minikube/ca.crt
- name: production
  cluster:
    server: https://k8s.example.com:6443
    insecure-skip-tls-verify: true
contexts:
- name: minikube
  context:
    cluster: minikube
    user: minikube
    namespace: default
- name: production
  context:
    cluster: production
    user: admin
users:
- name: minikube
  user:
    client-certificate: /home/user/.minikube/profiles/minikube/client.crt
    client-key: /home/user/.minikube/profiles/minikube/client.key
- name: admin
  user:
    token: abc
"#;

    #[test]
    fn test_parse_kubeconfig() {
        let config = KubeConfig::parse(SAMPLE).unwrap();

        assert_eq!(config.api_version, "v1");
        assert_eq!(config.kind, "Config");
        assert_eq!(config.current_context, "minikube");
        assert_eq!(config.contexts.len(), 2);
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.users.len(), 2);

        let ctx = config.current_context().unwrap();
        assert_eq!(ctx.name, "minikube");
        assert_eq!(ctx.context.cluster, "minikube");
        assert_eq!(ctx.context.namespace, Some("default".to_string()));

        let cluster = config.cluster("production").unwrap();
        assert!(cluster.cluster.insecure_skip_tls_verify);
        assert_eq!(cluster.cluster.certificate_authority_data, None);

        let minikube = config.cluster("minikube").unwrap();
        assert!(!minikube.cluster.insecure_skip_tls_verify);

        let admin = config.user("admin").unwrap();
        assert_eq!(admin.user.token.as_deref(), Some("abc"));
        assert_eq!(admin.user.client_certificate, None);
    }

    #[test]
    fn test_missing_top_level_fields_default() {
        let config = KubeConfig::parse("kind: Config\n").unwrap();
        assert_eq!(config.api_version, "");
        assert_eq!(config.current_context, "");
        assert!(config.clusters.is_empty());
        assert!(config.users.is_empty());
        assert!(config.contexts.is_empty());
        assert!(config.current_context().is_none());
    }

    #[test]
    fn test_missing_server_fails() {
        let yaml = r#"
clusters:
- name: broken
  cluster:
    insecure-skip-tls-verify: true
"#;
        let err = KubeConfig::parse(yaml).unwrap_err();
        assert!(matches!(err, ParseError::Invalid(_)));
        assert!(err.to_string().contains("server"));
    }

    #[test]
    fn test_missing_context_user_fails() {
        let yaml = r#"
contexts:
- name: half
  context:
    cluster: somewhere
"#;
        assert!(matches!(KubeConfig::parse(yaml), Err(ParseError::Invalid(_))));
    }

    #[test]
    fn test_non_mapping_document() {
        assert!(matches!(KubeConfig::parse("- a\n- b\n"), Err(ParseError::NotAMapping)));
        assert!(matches!(KubeConfig::parse("just a string"), Err(ParseError::NotAMapping)));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(KubeConfig::parse("clusters: [unclosed"), Err(ParseError::Yaml(_))));
    }

    #[test]
    fn test_duplicate_names_first_wins() {
        let yaml = r#"
clusters:
- name: dup
  cluster:
    server: https://first:6443
- name: dup
  cluster:
    server: https://second:6443
"#;
        let config = KubeConfig::parse(yaml).unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.cluster("dup").unwrap().cluster.server, "https://first:6443");
    }

    #[test]
    fn test_from_value() {
        let value: Value = serde_yaml_ng::from_str(SAMPLE).unwrap();
        let config = KubeConfig::from_value(value).unwrap();
        assert_eq!(config.current_context().unwrap().context.user, "minikube");
    }
}
