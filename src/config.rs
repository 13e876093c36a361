use crate::resources::ObjectKey;
use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path};
use tracing::info;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub target_config: TargetConfig,
    #[serde(default)]
    pub watch: Watch,
    #[serde(default)]
    pub webserver: Webserver,
    #[serde(default)]
    pub retry: Retry,
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
}

/// Identity of the singleton OLSConfig and the RAG entry that follows the watched tag.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    #[serde(default = "default_target_namespace")]
    pub namespace: String,
    #[serde(default = "default_target_name")]
    pub name: String,
    #[serde(default)]
    pub rag_index: usize,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watch {
    /// Watches all namespaces when unset
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl Watch {
    /// Neither a namespace nor a label selector narrows the watch
    pub fn is_cluster_wide(&self) -> bool {
        self.namespace.is_none() && self.label_selector.is_none()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Webserver {
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retry {
    #[serde(default = "default_retryable_seconds")]
    pub retryable_seconds: u64,
    #[serde(default = "default_fatal_seconds")]
    pub fatal_seconds: u64,
}

fn default_field_manager() -> String {
    "rag-imagestream-sync".to_string()
}

fn default_target_namespace() -> String {
    "openshift-lightspeed".to_string()
}

fn default_target_name() -> String {
    "cluster".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_retryable_seconds() -> u64 {
    5
}

fn default_fatal_seconds() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_config: TargetConfig::default(),
            watch: Watch::default(),
            webserver: Webserver::default(),
            retry: Retry::default(),
            field_manager: default_field_manager(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            namespace: default_target_namespace(),
            name: default_target_name(),
            rag_index: 0,
        }
    }
}

impl TargetConfig {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

impl Default for Webserver {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            retryable_seconds: default_retryable_seconds(),
            fatal_seconds: default_fatal_seconds(),
        }
    }
}

impl Retry {
    pub fn retryable(&self) -> Duration {
        Duration::from_secs(self.retryable_seconds)
    }

    pub fn fatal(&self) -> Duration {
        Duration::from_secs(self.fatal_seconds)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    info!("Loading config from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

    let expanded = expand_env_vars(&yaml_str)?;

    let config: Config = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML config after environment variable expansion")?;

    if config.target_config.namespace.is_empty() || config.target_config.name.is_empty() {
        bail!("targetConfig.namespace and targetConfig.name must not be empty");
    }
    if config.retry.retryable_seconds == 0 || config.retry.fatal_seconds == 0 {
        bail!("retry intervals must be at least one second");
    }

    Ok(config)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error naming the first missing env var.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| {
            missing.push(var_name.to_string());
            String::new()
        })
    });

    if let Some(var_name) = missing.first() {
        bail!("Missing environment variable: {}", var_name);
    }

    Ok(result.into_owned())
}
