use std::fs;
use std::path::{Path, PathBuf};

use aws_sdk_apigateway::error::{GetExportErrorKind, GetSdkErrorKind};
use aws_sdk_apigateway::types::SdkError;
use clap::ValueEnum;

use crate::error::{Error, Result};
use crate::outputs::StackOutputs;

const API_ID_KEY: &str = "ApiId";
const API_STAGE_KEY: &str = "ApiStage";
const SDK_TYPE: &str = "javascript";

/// API Gateway export extensions. Closed set, matched explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportExtensions {
    None,
    AwsIntegrations,
    Postman,
}

impl ExportExtensions {
    fn suffix(self) -> &'static str {
        match self {
            ExportExtensions::None => "",
            ExportExtensions::AwsIntegrations => "-aws",
            ExportExtensions::Postman => "-postman",
        }
    }

    fn parameters(self) -> Option<(&'static str, &'static str)> {
        match self {
            ExportExtensions::None => None,
            ExportExtensions::AwsIntegrations => Some(("extensions", "integrations")),
            ExportExtensions::Postman => Some(("extensions", "postman")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Yaml,
    Json,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Yaml => "yaml",
            ExportFormat::Json => "json",
        }
    }

    fn accepts(self) -> String {
        format!("application/{}", self.extension())
    }
}

/// `orders-api.yaml`, `orders-api-aws.yaml`, `orders-api-postman.yaml`.
pub fn spec_file_name(
    stack_name: &str,
    extensions: ExportExtensions,
    format: ExportFormat,
) -> String {
    format!(
        "{}-api{}.{}",
        stack_name,
        extensions.suffix(),
        format.extension()
    )
}

pub fn sdk_file_name(stack_name: &str, stage: &str) -> String {
    format!("{}-client-{}-{}.zip", stack_name, SDK_TYPE, stage)
}

/// API Gateway writes `url: https://host/{basePath}` with `basePath: /x`,
/// doubling the slash. Removing the slash before the variable is a required
/// post-processing step; applying it twice is a no-op.
pub fn fixup_base_path(text: &str) -> String {
    text.replace("/{basePath}", "{basePath}")
}

pub struct ApiExport {
    client: aws_sdk_apigateway::Client,
}

impl ApiExport {
    pub fn new(sdk_config: &aws_types::SdkConfig) -> Self {
        let client = aws_sdk_apigateway::Client::new(sdk_config);
        return Self { client };
    }

    /// Exports the stage's OpenAPI 3.0 document, applies the base-path
    /// fixup, and writes `<stack>-api<suffix>.<ext>` into `directory`.
    pub async fn export_spec(
        &self,
        outputs: &StackOutputs,
        stack_name: &str,
        directory: &Path,
        format: ExportFormat,
        extensions: ExportExtensions,
    ) -> Result<PathBuf> {
        let api_id = outputs.require(API_ID_KEY)?;
        let stage = outputs.require(API_STAGE_KEY)?;

        let mut request = self
            .client
            .get_export()
            .rest_api_id(api_id)
            .stage_name(stage)
            .export_type("oas30")
            .accepts(format.accepts());
        if let Some((key, value)) = extensions.parameters() {
            request = request.parameters(key, value);
        }

        let result = match request.send().await {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => match &err.kind {
                GetExportErrorKind::NotFoundException(_) => {
                    return Err(Error::NotFound(format!("api {} stage {}", api_id, stage)));
                }
                _ => return Err(Error::provider(err.code(), &err)),
            },
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        let body = result
            .body()
            .map(|blob| blob.as_ref().to_vec())
            .unwrap_or_default();
        let document = fixup_base_path(&String::from_utf8_lossy(&body));

        let path = directory.join(spec_file_name(stack_name, extensions, format));
        fs::write(&path, document)?;
        return Ok(path);
    }

    /// Exports the stage's generated JavaScript client archive and writes
    /// `<stack>-client-javascript-<stage>.zip` into `directory`.
    pub async fn export_sdk(
        &self,
        outputs: &StackOutputs,
        stack_name: &str,
        directory: &Path,
    ) -> Result<PathBuf> {
        let api_id = outputs.require(API_ID_KEY)?;
        let stage = outputs.require(API_STAGE_KEY)?;

        let result = self
            .client
            .get_sdk()
            .rest_api_id(api_id)
            .stage_name(stage)
            .sdk_type(SDK_TYPE)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(SdkError::ServiceError { err, .. }) => match &err.kind {
                GetSdkErrorKind::NotFoundException(_) => {
                    return Err(Error::NotFound(format!("api {} stage {}", api_id, stage)));
                }
                _ => return Err(Error::provider(err.code(), &err)),
            },
            Err(err) => return Err(Error::Unknown(err.to_string())),
        };

        let body = result
            .body()
            .map(|blob| blob.as_ref().to_vec())
            .unwrap_or_default();

        let path = directory.join(sdk_file_name(stack_name, stage));
        fs::write(&path, body)?;
        return Ok(path);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fixup_base_path, sdk_file_name, spec_file_name, ExportExtensions, ExportFormat,
    };

    #[test]
    fn spec_file_names() {
        assert_eq!(
            spec_file_name("orders", ExportExtensions::None, ExportFormat::Yaml),
            "orders-api.yaml"
        );
        assert_eq!(
            spec_file_name("orders", ExportExtensions::AwsIntegrations, ExportFormat::Yaml),
            "orders-api-aws.yaml"
        );
        assert_eq!(
            spec_file_name("orders", ExportExtensions::Postman, ExportFormat::Json),
            "orders-api-postman.json"
        );
    }

    #[test]
    fn sdk_file_name_includes_stage() {
        assert_eq!(
            sdk_file_name("orders", "prod"),
            "orders-client-javascript-prod.zip"
        );
    }

    #[test]
    fn fixup_removes_slash_before_base_path() {
        let raw = "url: https://dev-api.nod15c.com/{basePath}\nbasePath: /orders\n";
        let fixed = fixup_base_path(raw);
        assert!(!fixed.contains("/{basePath}"));
        assert!(fixed.contains("{basePath}"));
    }

    #[test]
    fn fixup_is_idempotent() {
        let raw = "url: https://dev-api.nod15c.com/{basePath}\n";
        let fixed = fixup_base_path(raw);
        assert_eq!(fixup_base_path(&fixed), fixed);
    }
}
