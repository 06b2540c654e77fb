//! Kubernetes integration module
//!
//! Provides kubeconfig parsing, credential resolution and caching, and HTTP
//! client construction for the API server.

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod secret;

pub use auth::{resolve, CredentialBundle, ErrorKind, KubeConfigError};
pub use cache::{CacheSettings, CredentialCache};
pub use client::{ClientError, ClientFactory};
pub use config::{KubeConfig, NamedCluster, NamedContext, NamedUser, ParseError};
pub use secret::SecretBytes;
