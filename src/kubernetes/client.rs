//! HTTP client construction from kubeconfig credentials
//!
//! [`ClientFactory`] owns the credential cache and turns a resolved
//! [`CredentialBundle`] into a `reqwest::Client` that talks to the API server,
//! or into a [`CostClient`] rooted at an API server proxy path.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use costquery_api::CostClient;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use reqwest::{Certificate, Identity};
use std::path::Path;
use thiserror::Error;

use super::auth::{CredentialBundle, KubeConfigError};
use super::cache::CredentialCache;
use super::secret::SecretBytes;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to resolve credentials: {0}")]
    Credentials(#[from] KubeConfigError),
    #[error("Invalid CA certificate: {0}")]
    InvalidCa(String),
    #[error("Invalid client certificate or key: {0}")]
    InvalidIdentity(#[source] reqwest::Error),
    #[error("Invalid authorization header: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Builds API server clients from cached kubeconfig credentials
pub struct ClientFactory {
    cache: CredentialCache,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::with_cache(CredentialCache::new())
    }

    pub fn with_cache(cache: CredentialCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Resolved credentials for `kubeconfig` (or the default kubeconfig)
    pub fn credentials(&self, kubeconfig: Option<&Path>) -> Result<CredentialBundle, ClientError> {
        Ok(self.cache.get_or_resolve(kubeconfig)?)
    }

    /// An HTTP client authenticated against the API server, with the bundle it
    /// was built from
    pub fn http_client(
        &self,
        kubeconfig: Option<&Path>,
    ) -> Result<(reqwest::Client, CredentialBundle), ClientError> {
        let bundle = self.credentials(kubeconfig)?;
        let client = build_http_client(&bundle)?;
        Ok((client, bundle))
    }

    /// A cost API client that reaches the service through `proxy_path` on the
    /// API server
    pub fn cost_client(
        &self,
        kubeconfig: Option<&Path>,
        proxy_path: &str,
    ) -> Result<CostClient, ClientError> {
        let (http, bundle) = self.http_client(kubeconfig)?;
        let base_url = proxy_base_url(&bundle.server_url, proxy_path);
        tracing::info!("Cost API base URL: {}", base_url);
        Ok(CostClient::new(http, base_url))
    }

    /// Stop the cache sweeper and scrub cached credentials
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }
}

impl Default for ClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the API server URL and a proxy path
pub fn proxy_base_url(server_url: &str, proxy_path: &str) -> String {
    let server = server_url.trim_end_matches('/');
    let path = proxy_path.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        format!("{}{}", server, path)
    } else {
        format!("{}/{}", server, path)
    }
}

/// Build a `reqwest::Client` from a credential bundle.
///
/// When CA data is present it replaces the built-in roots. A client identity is
/// configured only when both certificate and key are present. A bearer token
/// takes precedence over basic auth.
pub fn build_http_client(bundle: &CredentialBundle) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(bundle.insecure_skip);

    if let Some(ca) = bundle.ca_data.as_ref().filter(|ca| !ca.is_empty()) {
        let certs = Certificate::from_pem_bundle(ca.expose())
            .map_err(|e| ClientError::InvalidCa(e.to_string()))?;
        if certs.is_empty() {
            return Err(ClientError::InvalidCa("no PEM certificates found".into()));
        }
        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    if let (Some(cert), Some(key)) = (&bundle.cert_data, &bundle.key_data) {
        let mut pem = Vec::with_capacity(cert.len() + key.len() + 1);
        pem.extend_from_slice(cert.expose());
        pem.push(b'\n');
        pem.extend_from_slice(key.expose());
        let pem = SecretBytes::new(pem);
        let identity = Identity::from_pem(pem.expose()).map_err(ClientError::InvalidIdentity)?;
        builder = builder.identity(identity);
    } else if bundle.cert_data.is_some() || bundle.key_data.is_some() {
        tracing::warn!("kubeconfig user has only one of client certificate and key, skipping client identity");
    }

    if let Some(value) = authorization_header(bundle)? {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    builder.build().map_err(ClientError::Build)
}

fn authorization_header(bundle: &CredentialBundle) -> Result<Option<HeaderValue>, ClientError> {
    let raw = if let Some(token) = bundle.token.as_ref().filter(|t| !t.is_empty()) {
        let mut raw = b"Bearer ".to_vec();
        raw.extend_from_slice(token.expose());
        raw
    } else if let Some(username) = &bundle.username {
        let mut credentials = username.as_bytes().to_vec();
        credentials.push(b':');
        if let Some(password) = &bundle.password {
            credentials.extend_from_slice(password.expose());
        }
        let credentials = SecretBytes::new(credentials);
        format!("Basic {}", STANDARD.encode(credentials.expose())).into_bytes()
    } else {
        return Ok(None);
    };

    let raw = SecretBytes::new(raw);
    let mut value = HeaderValue::from_bytes(raw.expose())?;
    value.set_sensitive(true);
    Ok(Some(value))
}
