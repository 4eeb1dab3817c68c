use std::fmt;

use aws_sdk_cognitoidentityprovider::error::DescribeUserPoolClientErrorKind;
use aws_sdk_cognitoidentityprovider::types::SdkError;
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::outputs::StackOutputs;

/// Stack output key holding the app client id, unless overridden.
pub const DEFAULT_CLIENT_KEY: &str = "TestClientId";

const USER_POOL_ID_KEY: &str = "UserPoolId";
const USER_POOL_DOMAIN_KEY: &str = "UserPoolDomainName";

/// App client credentials from the user pool. The secret never leaves this
/// type in cleartext through `Debug` or `Serialize`; the parameter value
/// handed to the secret store is built via an explicit accessor.
#[derive(Clone, Serialize)]
pub struct ClientCredential {
    pub name: String,
    pub id: String,
    #[serde(serialize_with = "redact")]
    secret: String,
}

fn redact<S: Serializer>(_secret: &String, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str("***")
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("secret", &"***")
            .finish()
    }
}

impl ClientCredential {
    pub fn new(name: String, id: String, secret: String) -> Self {
        Self { name, id, secret }
    }

    /// `<client id>:<client secret>`, the value stored under the
    /// client-credentials parameter.
    pub fn parameter_value(&self) -> String {
        format!("{}:{}", self.id, self.secret)
    }
}

/// Auth domain of the user pool and the CDN distribution backing it.
#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub name: String,
    pub distribution_alias: String,
    pub status: String,
}

/// Looks up the required output keys for the client-credential call.
fn credential_keys<'a>(
    outputs: &'a StackOutputs,
    client_key: &str,
) -> Result<(&'a str, &'a str)> {
    let client_id = outputs.require(client_key)?;
    let user_pool_id = outputs.require(USER_POOL_ID_KEY)?;
    Ok((client_id, user_pool_id))
}

fn domain_name(outputs: &StackOutputs) -> Result<&str> {
    outputs.require(USER_POOL_DOMAIN_KEY)
}

pub struct Identity {
    client: aws_sdk_cognitoidentityprovider::Client,
}

impl Identity {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_cognitoidentityprovider::Client::new(sdk_config);
        return Self { client };
    }

    /// Fetches the app client's name, id and secret, keyed by the client id
    /// stored under `client_key` and the pool id from the stack outputs.
    pub async fn client_credential(
        &self,
        outputs: &StackOutputs,
        client_key: &str,
    ) -> Result<ClientCredential> {
        let (client_id, user_pool_id) = credential_keys(outputs, client_key)?;

        let result = self
            .client
            .describe_user_pool_client()
            .client_id(client_id)
            .user_pool_id(user_pool_id)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => match &err.kind {
                DescribeUserPoolClientErrorKind::ResourceNotFoundException(_) => {
                    return Err(Error::NotFound(format!("user pool client {}", client_id)));
                }
                _ => return Err(Error::provider(err.code(), &err)),
            },
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        let info = result
            .user_pool_client()
            .ok_or_else(|| Error::NotFound(format!("user pool client {}", client_id)))?;

        return Ok(ClientCredential::new(
            info.client_name().unwrap_or_default().to_string(),
            info.client_id().unwrap_or_default().to_string(),
            info.client_secret().unwrap_or_default().to_string(),
        ));
    }

    /// Fetches the user-pool auth domain and its distribution status.
    pub async fn auth_domain(&self, outputs: &StackOutputs) -> Result<DomainInfo> {
        let domain = domain_name(outputs)?;

        let result = self
            .client
            .describe_user_pool_domain()
            .domain(domain)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                return Err(Error::provider(err.code(), &err));
            }
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        // Cognito reports an unknown domain as an empty description rather
        // than an error.
        let distribution = result
            .domain_description()
            .and_then(|description| description.cloud_front_distribution())
            .ok_or_else(|| Error::NotFound(format!("auth domain {}", domain)))?;

        let status = result
            .domain_description()
            .and_then(|description| description.status())
            .map(|status| status.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        return Ok(DomainInfo {
            name: domain.to_string(),
            distribution_alias: distribution.to_string(),
            status,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{credential_keys, domain_name, ClientCredential, DEFAULT_CLIENT_KEY};
    use crate::error::Error;
    use crate::outputs::StackOutputs;

    fn outputs(pairs: &[(&str, &str)]) -> StackOutputs {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StackOutputs::new(map)
    }

    #[test]
    fn credential_keys_resolve() {
        let outputs = outputs(&[("TestClientId", "client-1"), ("UserPoolId", "pool-1")]);
        let (client_id, user_pool_id) =
            credential_keys(&outputs, DEFAULT_CLIENT_KEY).unwrap();
        assert_eq!(client_id, "client-1");
        assert_eq!(user_pool_id, "pool-1");
    }

    #[test]
    fn credential_keys_missing_client_id() {
        let outputs = outputs(&[("UserPoolId", "pool-1")]);
        match credential_keys(&outputs, DEFAULT_CLIENT_KEY) {
            Err(Error::MissingKey(key)) => assert_eq!(key, "TestClientId"),
            _ => panic!("Expected `MissingKey` error"),
        }
    }

    #[test]
    fn credential_keys_missing_pool_id() {
        let outputs = outputs(&[("TestClientId", "client-1")]);
        match credential_keys(&outputs, DEFAULT_CLIENT_KEY) {
            Err(Error::MissingKey(key)) => assert_eq!(key, "UserPoolId"),
            _ => panic!("Expected `MissingKey` error"),
        }
    }

    #[test]
    fn domain_name_missing_key() {
        let outputs = outputs(&[]);
        match domain_name(&outputs) {
            Err(Error::MissingKey(key)) => assert_eq!(key, "UserPoolDomainName"),
            _ => panic!("Expected `MissingKey` error"),
        }
    }

    #[test]
    fn debug_redacts_secret() {
        let credential = ClientCredential::new(
            "web".to_string(),
            "client-1".to_string(),
            "hunter2".to_string(),
        );
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn serialize_redacts_secret() {
        let credential = ClientCredential::new(
            "web".to_string(),
            "client-1".to_string(),
            "hunter2".to_string(),
        );
        let rendered = serde_yaml::to_string(&credential).unwrap();
        assert!(rendered.contains("***"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn parameter_value_joins_id_and_secret() {
        let credential = ClientCredential::new(
            "web".to_string(),
            "client-1".to_string(),
            "hunter2".to_string(),
        );
        assert_eq!(credential.parameter_value(), "client-1:hunter2");
    }
}
