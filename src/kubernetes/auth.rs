//! Credential resolution
//!
//! Locates a kubeconfig, resolves the current context to its cluster and user,
//! and decodes the TLS material into a [`CredentialBundle`].

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::config::{KubeConfig, ParseError};
use super::secret::SecretBytes;

/// Environment variable naming an alternate kubeconfig
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Lifetime of a resolved bundle
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Broad category of a [`KubeConfigError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing file, context, cluster or user
    NotFound,
    /// Unreadable or structurally invalid kubeconfig
    Config,
    /// Malformed inline base64 data
    Decode,
    /// Referenced certificate, key or CA file unreadable
    Io,
}

#[derive(Debug, Error)]
pub enum KubeConfigError {
    #[error("No kubeconfig found")]
    NotFound,
    #[error("Kubeconfig not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Context not found: {0}")]
    ContextNotFound(String),
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Failed to read kubeconfig {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse kubeconfig {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("Failed to decode {field}: {source}")]
    DecodeError {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("Failed to read {field} file {path}: {source}")]
    IoError {
        field: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KubeConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KubeConfigError::NotFound
            | KubeConfigError::FileNotFound(_)
            | KubeConfigError::ContextNotFound(_)
            | KubeConfigError::ClusterNotFound(_)
            | KubeConfigError::UserNotFound(_) => ErrorKind::NotFound,
            KubeConfigError::ReadError { .. } | KubeConfigError::ParseError { .. } => {
                ErrorKind::Config
            }
            KubeConfigError::DecodeError { .. } => ErrorKind::Decode,
            KubeConfigError::IoError { .. } => ErrorKind::Io,
        }
    }
}

/// Server address and decoded TLS/auth material for one context
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    pub server_url: String,
    pub cert_data: Option<SecretBytes>,
    pub key_data: Option<SecretBytes>,
    pub ca_data: Option<SecretBytes>,
    pub insecure_skip: bool,
    pub token: Option<SecretBytes>,
    pub username: Option<String>,
    pub password: Option<SecretBytes>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl CredentialBundle {
    /// A bundle with no TLS material, stamped now with the given lifetime
    pub fn new(server_url: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            server_url: server_url.into(),
            cert_data: None,
            key_data: None,
            ca_data: None,
            insecure_skip: false,
            token: None,
            username: None,
            password: None,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_accessed: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True when both halves of a client identity are present
    pub fn has_client_identity(&self) -> bool {
        self.cert_data.is_some() && self.key_data.is_some()
    }

    /// Overwrite every secret buffer with zeros
    pub fn scrub(&mut self) {
        for secret in [
            &mut self.cert_data,
            &mut self.key_data,
            &mut self.ca_data,
            &mut self.token,
            &mut self.password,
        ]
        .into_iter()
        .flatten()
        {
            secret.scrub();
        }
    }
}

/// Find the kubeconfig to use when none is given
pub fn locate_kubeconfig() -> Result<PathBuf, KubeConfigError> {
    locate_kubeconfig_in(std::env::var_os(KUBECONFIG_ENV), dirs::home_dir())
}

/// Lookup order: the first entry of `env_value`, then `<home>/.kube/config`.
/// Only existing files are returned; the remaining `KUBECONFIG` entries are not
/// merged.
pub fn locate_kubeconfig_in(
    env_value: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf, KubeConfigError> {
    if let Some(value) = env_value.filter(|v| !v.is_empty()) {
        if let Some(path) = std::env::split_paths(&value).next() {
            if path.is_file() {
                return Ok(path);
            }
            tracing::debug!("{} entry {:?} does not exist", KUBECONFIG_ENV, path);
        }
    }

    let path = home.ok_or(KubeConfigError::NotFound)?.join(".kube").join("config");
    if path.is_file() {
        Ok(path)
    } else {
        Err(KubeConfigError::NotFound)
    }
}

/// Load and parse the kubeconfig at `path`
pub fn load_kubeconfig(path: &Path) -> Result<KubeConfig, KubeConfigError> {
    if !path.is_file() {
        return Err(KubeConfigError::FileNotFound(path.to_path_buf()));
    }
    // World-readable kubeconfigs are normal for shared cluster access, so
    // permissions are not checked.
    let content = fs::read_to_string(path).map_err(|source| KubeConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    KubeConfig::parse(&content).map_err(|source| KubeConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve credentials with the default lifetime
pub fn resolve(path: Option<&Path>) -> Result<CredentialBundle, KubeConfigError> {
    resolve_with_ttl(path, DEFAULT_TTL)
}

/// Resolve credentials for the current context of the kubeconfig at `path`,
/// or of the located default kubeconfig when `path` is `None`
pub fn resolve_with_ttl(
    path: Option<&Path>,
    ttl: Duration,
) -> Result<CredentialBundle, KubeConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => locate_kubeconfig()?,
    };
    let config = load_kubeconfig(&path)?;
    let bundle = resolve_config(&config, path.parent(), ttl)?;
    tracing::info!(
        "Resolved kubeconfig {:?} context {:?} -> {}",
        path,
        config.current_context,
        bundle.server_url
    );
    Ok(bundle)
}

/// Resolve credentials from a parsed config. Relative file references are
/// taken from `base_dir`.
pub fn resolve_config(
    config: &KubeConfig,
    base_dir: Option<&Path>,
    ttl: Duration,
) -> Result<CredentialBundle, KubeConfigError> {
    let context = config
        .current_context()
        .ok_or_else(|| KubeConfigError::ContextNotFound(config.current_context.clone()))?;
    let cluster = config
        .cluster(&context.context.cluster)
        .ok_or_else(|| KubeConfigError::ClusterNotFound(context.context.cluster.clone()))?;
    let user = config
        .user(&context.context.user)
        .ok_or_else(|| KubeConfigError::UserNotFound(context.context.user.clone()))?;

    let cluster = &cluster.cluster;
    let user = &user.user;

    let mut bundle = CredentialBundle::new(cluster.server.clone(), ttl);
    bundle.insecure_skip = cluster.insecure_skip_tls_verify;
    bundle.ca_data = load_material(
        "certificate-authority",
        cluster.certificate_authority_data.as_deref(),
        cluster.certificate_authority.as_deref(),
        base_dir,
    )?;
    bundle.cert_data = load_material(
        "client-certificate",
        user.client_certificate_data.as_deref(),
        user.client_certificate.as_deref(),
        base_dir,
    )?;
    bundle.key_data = load_material(
        "client-key",
        user.client_key_data.as_deref(),
        user.client_key.as_deref(),
        base_dir,
    )?;
    bundle.token = user.token.as_deref().map(SecretBytes::from);
    bundle.username = user.username.clone();
    bundle.password = user.password.as_deref().map(SecretBytes::from);

    Ok(bundle)
}

/// Inline data wins over a file reference; the file is only read when no
/// inline data is present
fn load_material(
    field: &'static str,
    inline: Option<&str>,
    file: Option<&str>,
    base_dir: Option<&Path>,
) -> Result<Option<SecretBytes>, KubeConfigError> {
    if let Some(data) = inline.filter(|d| !d.is_empty()) {
        return decode_base64(data)
            .map(|bytes| Some(SecretBytes::new(bytes)))
            .map_err(|source| KubeConfigError::DecodeError { field, source });
    }

    if let Some(file) = file.filter(|f| !f.is_empty()) {
        let path = match base_dir {
            Some(dir) if Path::new(file).is_relative() => dir.join(file),
            _ => PathBuf::from(file),
        };
        return fs::read(&path)
            .map(|bytes| Some(SecretBytes::new(bytes)))
            .map_err(|source| KubeConfigError::IoError { field, path, source });
    }

    Ok(None)
}

/// Decode standard base64, ignoring ASCII whitespace from wrapped lines
pub fn decode_base64(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if data.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        STANDARD.decode(compact)
    } else {
        STANDARD.decode(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TOKEN_CONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: ctx
clusters:
- name: c1
  cluster:
    server: https://10.0.0.1:6443
    certificate-authority-data: Zm9v
users:
- name: u1
  user:
    token: abc
contexts:
- name: ctx
  context:
    cluster: c1
    user: u1
"#;

    fn resolve_str(yaml: &str) -> Result<CredentialBundle, KubeConfigError> {
        let config = KubeConfig::parse(yaml).unwrap();
        resolve_config(&config, None, DEFAULT_TTL)
    }

    #[test]
    fn test_token_scenario() {
        let bundle = resolve_str(TOKEN_CONFIG).unwrap();
        assert_eq!(bundle.server_url, "https://10.0.0.1:6443");
        assert_eq!(bundle.ca_data.as_ref().unwrap().expose(), b"foo");
        assert!(bundle.cert_data.is_none());
        assert!(bundle.key_data.is_none());
        assert_eq!(bundle.token.as_ref().unwrap().expose(), b"abc");
        assert!(!bundle.insecure_skip);
        assert!(!bundle.has_client_identity());
    }

    #[test]
    fn test_expiry_stamps() {
        let bundle = resolve_str(TOKEN_CONFIG).unwrap();
        assert_eq!(bundle.created_at, bundle.last_accessed);
        assert_eq!(bundle.expires_at - bundle.created_at, chrono::Duration::hours(1));
        assert!(!bundle.is_expired());
        assert!(bundle.is_expired_at(bundle.expires_at));
    }

    #[test]
    fn test_missing_context() {
        let yaml = TOKEN_CONFIG.replace("current-context: ctx", "current-context: nope");
        let err = resolve_str(&yaml).unwrap_err();
        assert!(matches!(err, KubeConfigError::ContextNotFound(ref n) if n == "nope"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_missing_cluster_and_user() {
        let yaml = TOKEN_CONFIG.replace("cluster: c1", "cluster: gone");
        let err = resolve_str(&yaml).unwrap_err();
        assert!(matches!(err, KubeConfigError::ClusterNotFound(ref n) if n == "gone"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let yaml = TOKEN_CONFIG.replace("user: u1", "user: gone");
        let err = resolve_str(&yaml).unwrap_err();
        assert!(matches!(err, KubeConfigError::UserNotFound(ref n) if n == "gone"));
    }

    #[test]
    fn test_malformed_base64() {
        let yaml = TOKEN_CONFIG.replace("Zm9v", "not*base64");
        let err = resolve_str(&yaml).unwrap_err();
        assert!(matches!(
            err,
            KubeConfigError::DecodeError { field: "certificate-authority", .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_inline_wins_over_file() {
        let yaml = TOKEN_CONFIG.replace(
            "certificate-authority-data: Zm9v",
            "certificate-authority-data: Zm9v\n    certificate-authority: /does/not/exist/ca.crt",
        );
        let bundle = resolve_str(&yaml).unwrap();
        assert_eq!(bundle.ca_data.unwrap().expose(), b"foo");
    }

    #[test]
    fn test_file_references_relative_to_kubeconfig() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("client.crt"), b"CERT").unwrap();
        fs::write(dir.path().join("client.key"), b"KEY").unwrap();

        let yaml = TOKEN_CONFIG.replace(
            "token: abc",
            "client-certificate: client.crt\n    client-key: client.key",
        );
        let config = KubeConfig::parse(&yaml).unwrap();
        let bundle = resolve_config(&config, Some(dir.path()), DEFAULT_TTL).unwrap();

        assert_eq!(bundle.cert_data.as_ref().unwrap().expose(), b"CERT");
        assert_eq!(bundle.key_data.as_ref().unwrap().expose(), b"KEY");
        assert!(bundle.has_client_identity());
        assert!(bundle.token.is_none());
    }

    #[test]
    fn test_unreadable_key_file() {
        let yaml = TOKEN_CONFIG.replace("token: abc", "client-key: /does/not/exist/client.key");
        let err = resolve_str(&yaml).unwrap_err();
        assert!(matches!(err, KubeConfigError::IoError { field: "client-key", .. }));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_cert_without_key_is_allowed() {
        let yaml = TOKEN_CONFIG.replace("token: abc", "client-certificate-data: Q0VSVA==");
        let bundle = resolve_str(&yaml).unwrap();
        assert_eq!(bundle.cert_data.as_ref().unwrap().expose(), b"CERT");
        assert!(bundle.key_data.is_none());
    }

    #[test]
    fn test_base64_round_trip() {
        for encoded in ["Zm9v", "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0tCg==", ""] {
            let decoded = decode_base64(encoded).unwrap();
            assert_eq!(STANDARD.encode(decoded), encoded);
        }
    }

    #[test]
    fn test_base64_ignores_line_wrapping() {
        assert_eq!(decode_base64("Zm9v\nYmFy\n").unwrap(), b"foobar");
    }

    #[test]
    fn test_bundle_scrub() {
        let mut bundle = resolve_str(TOKEN_CONFIG).unwrap();
        bundle.scrub();
        assert!(bundle.ca_data.as_ref().unwrap().is_scrubbed());
        assert!(bundle.token.as_ref().unwrap().is_scrubbed());
        assert_eq!(bundle.server_url, "https://10.0.0.1:6443");
    }

    #[test]
    fn test_locate_prefers_env() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join("env-config");
        fs::write(&env_path, TOKEN_CONFIG).unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(home.join(".kube")).unwrap();
        fs::write(home.join(".kube").join("config"), TOKEN_CONFIG).unwrap();

        let found = locate_kubeconfig_in(Some(env_path.clone().into_os_string()), Some(home.clone())).unwrap();
        assert_eq!(found, env_path);

        let found = locate_kubeconfig_in(None, Some(home.clone())).unwrap();
        assert_eq!(found, home.join(".kube").join("config"));
    }

    #[test]
    fn test_locate_falls_back_when_env_missing() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("home");
        fs::create_dir_all(home.join(".kube")).unwrap();
        fs::write(home.join(".kube").join("config"), TOKEN_CONFIG).unwrap();

        let missing = dir.path().join("missing").into_os_string();
        let found = locate_kubeconfig_in(Some(missing), Some(home.clone())).unwrap();
        assert_eq!(found, home.join(".kube").join("config"));
    }

    #[test]
    fn test_locate_nothing() {
        let dir = tempdir().unwrap();
        let err = locate_kubeconfig_in(None, Some(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, KubeConfigError::NotFound));
        assert!(matches!(locate_kubeconfig_in(None, None), Err(KubeConfigError::NotFound)));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = load_kubeconfig(&missing).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let broken = dir.path().join("broken");
        fs::write(&broken, "clusters:\n- name: x\n  cluster: {}\n").unwrap();
        let err = load_kubeconfig(&broken).unwrap_err();
        assert!(matches!(err, KubeConfigError::ParseError { .. }));
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
