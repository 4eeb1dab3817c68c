use aws_sdk_secretsmanager::error::PutSecretValueErrorKind;
use aws_sdk_secretsmanager::types::SdkError;

use crate::error::{Error, Result};

pub struct SecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretStore {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_secretsmanager::Client::new(sdk_config);
        return Self { client };
    }

    /// Puts a new secret value, creating the secret when it does not exist
    /// yet. `description` is only used on creation.
    pub async fn upsert(&self, name: &str, description: &str, value: &str) -> Result<()> {
        let result = self
            .client
            .put_secret_value()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError { err, .. }) => match &err.kind {
                PutSecretValueErrorKind::ResourceNotFoundException(_) => {
                    self.create(name, description, value).await
                }
                _ => Err(Error::provider(err.code(), &err)),
            },
            Err(err) => Err(Error::Unknown(err.to_string())),
        }
    }

    async fn create(&self, name: &str, description: &str, value: &str) -> Result<()> {
        tracing::info!(secret = name, "creating secret");
        let mut request = self.client.create_secret().name(name).secret_string(value);
        if !description.is_empty() {
            request = request.description(description);
        }
        let result = request.send().await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError { err, .. }) => Err(Error::provider(err.code(), &err)),
            Err(err) => Err(Error::Unknown(err.to_string())),
        }
    }

    /// Deletes immediately, skipping the recovery window.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let result = self
            .client
            .delete_secret()
            .secret_id(name)
            .force_delete_without_recovery(true)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError { err, .. }) => Err(Error::provider(err.code(), &err)),
            Err(err) => Err(Error::Unknown(err.to_string())),
        }
    }
}
