use aws_sdk_route53::model::{
    AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecordSet, RrType,
};
use aws_sdk_route53::types::SdkError;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::identity::DomainInfo;

/// Well-known hosted zone id for CloudFront alias targets.
pub const CLOUDFRONT_ALIAS_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Root two-label domain with a trailing dot appended exactly once:
/// `foo.bar.example.com.` => `example.com.`.
pub fn apex_domain(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').filter(|label| !label.is_empty()).collect();
    let start = labels.len().saturating_sub(2);
    format!("{}.", labels[start..].join("."))
}

/// `/hostedzone/Z2X325LEDJ47O` => `Z2X325LEDJ47O`.
fn short_zone_id(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

#[derive(Debug, Clone, Serialize)]
pub struct HostedZoneInfo {
    pub domain_name: String,
    pub zone_id: String,
    pub zone_id_fully_qualified: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasAction {
    Upsert,
    Delete,
}

impl AliasAction {
    fn change_action(self) -> ChangeAction {
        match self {
            AliasAction::Upsert => ChangeAction::Upsert,
            AliasAction::Delete => ChangeAction::Delete,
        }
    }

    fn comment(self) -> &'static str {
        match self {
            AliasAction::Upsert => "Create alias for user pool domain",
            AliasAction::Delete => "Remove alias for user pool domain",
        }
    }
}

pub struct Dns {
    client: aws_sdk_route53::Client,
}

impl Dns {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_route53::Client::new(sdk_config);
        return Self { client };
    }

    /// Resolves a zone by exact name over a single listing page. A truncated
    /// listing is an explicit unsupported case, not silently paginated.
    pub async fn hosted_zone(&self, name: &str) -> Result<HostedZoneInfo> {
        let result = self.client.list_hosted_zones().send().await;
        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                return Err(Error::provider(err.code(), &err));
            }
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        if result.is_truncated() {
            return Err(Error::NotFound(format!(
                "hosted zone {} (zone listing truncated, pagination unsupported)",
                name
            )));
        }

        let zones = result.hosted_zones().unwrap_or_default();
        let zone = zones
            .iter()
            .find(|zone| zone.name() == Some(name))
            .ok_or_else(|| Error::NotFound(format!("hosted zone {}", name)))?;

        let id = zone
            .id()
            .ok_or_else(|| Error::NotFound(format!("hosted zone {} has no id", name)))?;

        return Ok(HostedZoneInfo {
            domain_name: name.to_string(),
            zone_id: short_zone_id(id).to_string(),
            zone_id_fully_qualified: id.to_string(),
        });
    }

    /// Submits an A-record alias change for the domain against its apex
    /// zone, pointing at the CDN distribution. Returns the reported change
    /// status; submission failures are surfaced, not retried.
    pub async fn apply_alias(&self, domain: &DomainInfo, action: AliasAction) -> Result<String> {
        let apex = apex_domain(&domain.name);
        let zone = self.hosted_zone(&apex).await?;

        let record_set = ResourceRecordSet::builder()
            .name(&domain.name)
            .r#type(RrType::A)
            .alias_target(
                AliasTarget::builder()
                    .hosted_zone_id(CLOUDFRONT_ALIAS_ZONE_ID)
                    .dns_name(&domain.distribution_alias)
                    .evaluate_target_health(false)
                    .build(),
            )
            .build();

        let batch = ChangeBatch::builder()
            .comment(action.comment())
            .changes(
                Change::builder()
                    .action(action.change_action())
                    .resource_record_set(record_set)
                    .build(),
            )
            .build();

        let result = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(&zone.zone_id)
            .change_batch(batch)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => {
                return Err(Error::provider(err.code(), &err));
            }
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        let status = result
            .change_info()
            .and_then(|info| info.status())
            .map(|status| status.as_str().to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        return Ok(status);
    }
}
