pub mod config;
pub mod kubernetes;
pub mod report;

pub use config::QuerySettings;
pub use kubernetes::{ClientFactory, CredentialBundle, CredentialCache, KubeConfig, KubeConfigError};
