use std::collections::{BTreeMap, BTreeSet};

use aws_sdk_ssm::error::DeleteParameterErrorKind;
use aws_sdk_ssm::model::ParameterType;
use aws_sdk_ssm::types::SdkError;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::identity::ClientCredential;

/// Local keys ending in this marker are written as SecureString, with the
/// marker stripped from the remote name.
pub const SECURE_MARKER: char = '!';

/// Default parameter path for pushed client credentials.
pub const CLIENT_CREDS_BASE: &str = "/api/clientcreds";

static PARAM_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.\-/]+$").unwrap());

/// True when `name` is a syntactically valid parameter name.
pub fn is_valid_name(name: &str) -> bool {
    PARAM_NAME.is_match(name)
}

pub fn split_secure_marker(key: &str) -> (&str, bool) {
    match key.strip_suffix(SECURE_MARKER) {
        Some(name) => (name, true),
        None => (key, false),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPut {
    pub name: String,
    pub value: String,
    pub secure: bool,
}

/// Pure diff of local flat values against remote parameters. Deletions are
/// applied before additions.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub to_put: Vec<PlannedPut>,
    pub to_delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_put.is_empty() && self.to_delete.is_empty()
    }
}

/// Computes the plan for making the remote prefix match `local`. A key whose
/// remote value already equals the local value is skipped, so re-running an
/// unchanged sync plans nothing.
pub fn plan_sync(
    local: &BTreeMap<String, String>,
    remote: &BTreeMap<String, String>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();
    let mut keep = BTreeSet::new();

    for (key, value) in local {
        let (name, secure) = split_secure_marker(key);
        keep.insert(name);
        if remote.get(name).map(String::as_str) != Some(value.as_str()) {
            plan.to_put.push(PlannedPut {
                name: name.to_string(),
                value: value.clone(),
                secure,
            });
        }
    }

    for name in remote.keys() {
        if !keep.contains(name.as_str()) {
            plan.to_delete.push(name.clone());
        }
    }

    return plan;
}

/// Keys actually written, deleted, and failed by one `apply` run. No
/// rollback: a failed key is recorded and the batch continues.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

pub fn client_credential_name(base: &str, client_name: &str) -> String {
    format!("{}/{}", base, client_name)
}

pub struct ParameterStore {
    client: aws_sdk_ssm::Client,
}

impl ParameterStore {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_ssm::Client::new(sdk_config);
        return Self { client };
    }

    /// Names of all parameters under `path`, recursively.
    pub async fn names_under(&self, path: &str) -> Result<Vec<String>> {
        let stream = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .into_paginator()
            .send();
        futures::pin_mut!(stream);

        let mut names = Vec::new();
        while let Some(page) = stream.next().await {
            let page = match page {
                Ok(page) => page,
                Err(SdkError::ServiceError { err, .. }) => {
                    return Err(Error::provider(err.code(), &err));
                }
                Err(err) => return Err(Error::Unknown(err.to_string())),
            };
            for parameter in page.parameters().unwrap_or_default() {
                if let Some(name) = parameter.name() {
                    names.push(name.to_string());
                }
            }
        }
        return Ok(names);
    }

    /// Name-value pairs of all parameters under `path`, recursively,
    /// decrypted so SecureString values compare against local cleartext.
    pub async fn values_under(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let stream = self
            .client
            .get_parameters_by_path()
            .path(path)
            .recursive(true)
            .with_decryption(true)
            .into_paginator()
            .send();
        futures::pin_mut!(stream);

        let mut values = BTreeMap::new();
        while let Some(page) = stream.next().await {
            let page = match page {
                Ok(page) => page,
                Err(SdkError::ServiceError { err, .. }) => {
                    return Err(Error::provider(err.code(), &err));
                }
                Err(err) => return Err(Error::Unknown(err.to_string())),
            };
            for parameter in page.parameters().unwrap_or_default() {
                if let (Some(name), Some(value)) = (parameter.name(), parameter.value()) {
                    values.insert(name.to_string(), value.to_string());
                }
            }
        }
        return Ok(values);
    }

    pub async fn put_string(&self, name: &str, value: &str) -> Result<()> {
        self.put(name, value, ParameterType::String, None).await
    }

    pub async fn put_secure(&self, name: &str, value: &str) -> Result<()> {
        self.put(name, value, ParameterType::SecureString, None).await
    }

    /// Writes the `<id>:<secret>` credential value under
    /// `<base>/<client name>` as a SecureString; returns the parameter name.
    pub async fn put_client_credential(
        &self,
        credential: &ClientCredential,
        base: &str,
    ) -> Result<String> {
        let name = client_credential_name(base, &credential.name);
        let description = format!("Client ID and secret for {}", name);
        self.put(
            &name,
            &credential.parameter_value(),
            ParameterType::SecureString,
            Some(&description),
        )
        .await?;
        return Ok(name);
    }

    async fn put(
        &self,
        name: &str,
        value: &str,
        parameter_type: ParameterType,
        description: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(parameter_type)
            .overwrite(true);
        if let Some(description) = description {
            request = request.description(description);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError { err, .. }) => Err(Error::provider(err.code(), &err)),
            Err(err) => Err(Error::Unknown(err.to_string())),
        }
    }

    /// Deletes a parameter; a missing parameter is a no-op and returns
    /// `false`.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let result = self.client.delete_parameter().name(name).send().await;
        match result {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError { err, .. }) => match &err.kind {
                DeleteParameterErrorKind::ParameterNotFound(_) => Ok(false),
                _ => Err(Error::provider(err.code(), &err)),
            },
            Err(err) => Err(Error::Unknown(err.to_string())),
        }
    }

    /// Applies a plan, deletions first. Per-key failures are logged and the
    /// batch continues.
    pub async fn apply(&self, plan: &SyncPlan) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        for name in &plan.to_delete {
            match self.delete(name).await {
                Ok(true) => {
                    tracing::info!(name = name.as_str(), "deleted parameter");
                    outcome.removed.push(name.clone());
                }
                Ok(false) => {
                    tracing::info!(name = name.as_str(), "parameter already absent");
                }
                Err(error) => {
                    tracing::warn!(name = name.as_str(), %error, "delete failed");
                    outcome.failed.push(name.clone());
                }
            }
        }

        for put in &plan.to_put {
            let result = if put.secure {
                self.put_secure(&put.name, &put.value).await
            } else {
                self.put_string(&put.name, &put.value).await
            };
            match result {
                Ok(()) => {
                    tracing::info!(name = put.name.as_str(), secure = put.secure, "put parameter");
                    outcome.added.push(put.name.clone());
                }
                Err(error) => {
                    tracing::warn!(name = put.name.as_str(), %error, "put failed");
                    outcome.failed.push(put.name.clone());
                }
            }
        }

        return outcome;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{
        client_credential_name, is_valid_name, plan_sync, split_secure_marker, SyncPlan,
    };

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn valid_parameter_names() {
        assert!(is_valid_name("/app/db/host"));
        assert!(is_valid_name("app_1.name-x"));
        assert!(!is_valid_name("/app/db host"));
        assert!(!is_valid_name("/app/token!"));
    }

    #[test]
    fn secure_marker_is_stripped() {
        assert_eq!(split_secure_marker("/app/token!"), ("/app/token", true));
        assert_eq!(split_secure_marker("/app/host"), ("/app/host", false));
    }

    #[test]
    fn plans_adds_updates_and_removes() {
        let local = map(&[
            ("/app/host", "localhost"),
            ("/app/port", "5432"),
            ("/app/token!", "s3cret"),
        ]);
        let remote = map(&[
            ("/app/host", "otherhost"),
            ("/app/port", "5432"),
            ("/app/stale", "x"),
        ]);

        let plan = plan_sync(&local, &remote);

        let put_names: Vec<&str> = plan.to_put.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(put_names, vec!["/app/host", "/app/token"]);
        assert!(plan.to_put.iter().any(|p| p.name == "/app/token" && p.secure));
        assert_eq!(plan.to_delete, vec!["/app/stale".to_string()]);
    }

    #[test]
    fn plan_is_idempotent_once_remote_matches() {
        let local = map(&[("/app/host", "localhost"), ("/app/token!", "s3cret")]);
        // Remote state after a successful first run: markers stripped,
        // secure values decrypted.
        let remote = map(&[("/app/host", "localhost"), ("/app/token", "s3cret")]);

        let plan = plan_sync(&local, &remote);
        assert_eq!(plan, SyncPlan::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn empty_local_removes_everything() {
        let local = map(&[]);
        let remote = map(&[("/app/host", "localhost")]);

        let plan = plan_sync(&local, &remote);
        assert!(plan.to_put.is_empty());
        assert_eq!(plan.to_delete, vec!["/app/host".to_string()]);
    }

    #[test]
    fn credential_name_under_base() {
        assert_eq!(
            client_credential_name("/api/clientcreds", "web"),
            "/api/clientcreds/web"
        );
    }
}
