use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use aws_sdk_cloudformation::types::SdkError;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key-value map of a stack's deployment outputs. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackOutputs {
    map: BTreeMap<String, String>,
}

impl StackOutputs {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        return Self { map };
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Looks up a required key; no defaulting.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Appends the default `.yaml` suffix to a cache name that has none.
pub fn ensure_suffix(name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    match path.extension() {
        Some(_) => path,
        None => path.with_extension("yaml"),
    }
}

pub fn load_cache(path: &Path) -> Result<StackOutputs> {
    let contents = std::fs::read_to_string(path)?;
    let outputs: StackOutputs = serde_yaml::from_str(&contents)?;
    return Ok(outputs);
}

pub fn save_cache(path: &Path, outputs: &StackOutputs) -> Result<()> {
    let contents = serde_yaml::to_string(outputs)?;
    std::fs::write(path, contents)?;
    return Ok(());
}

pub struct Resolver {
    client: aws_sdk_cloudformation::Client,
}

impl Resolver {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_cloudformation::Client::new(sdk_config);
        return Self { client };
    }

    /// Resolves a stack's outputs, preferring the cache file when one is
    /// given and loads. A stale cache is returned verbatim until deleted
    /// externally; cache write failures are logged and otherwise ignored.
    pub async fn resolve(&self, stack_name: &str, cache: Option<&Path>) -> Result<StackOutputs> {
        let cache = match cache {
            Some(path) => path,
            None => return self.fetch(stack_name).await,
        };

        match load_cache(cache) {
            Ok(outputs) => {
                tracing::debug!(cache = %cache.display(), "using cached stack outputs");
                return Ok(outputs);
            }
            Err(error) => {
                tracing::warn!(
                    cache = %cache.display(),
                    %error,
                    "cache unavailable, fetching stack outputs"
                );
            }
        }

        let outputs = self.fetch(stack_name).await?;
        if let Err(error) = save_cache(cache, &outputs) {
            tracing::warn!(cache = %cache.display(), %error, "failed to write cache");
        }
        return Ok(outputs);
    }

    pub async fn fetch(&self, stack_name: &str) -> Result<StackOutputs> {
        tracing::info!(stack = stack_name, "getting stack outputs");
        let result = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                // A missing stack surfaces as a ValidationError, not a
                // dedicated not-found code.
                let message = err.to_string();
                if err.code() == Some("ValidationError") && message.contains("does not exist") {
                    return Err(Error::NotFound(format!("stack {}", stack_name)));
                }
                return Err(Error::provider(err.code(), message));
            }
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        let stacks = result.stacks().unwrap_or_default();
        let stack = match stacks.first() {
            Some(stack) => stack,
            None => return Err(Error::NotFound(format!("stack {}", stack_name))),
        };

        let map = stack
            .outputs()
            .unwrap_or_default()
            .iter()
            .filter_map(|output| {
                let key = output.output_key()?.to_string();
                let value = output.output_value()?.to_string();
                Some((key, value))
            })
            .collect();

        return Ok(StackOutputs::new(map));
    }
}
