use std::path::PathBuf;

use anyhow::Context;
use aws_config::meta::region::RegionProviderChain;
use aws_types::region::Region;
use aws_types::SdkConfig;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::console::{self, ConfirmPolicy};
use crate::dns::{AliasAction, Dns};
use crate::export::{ApiExport, ExportExtensions, ExportFormat};
use crate::identity::{self, ClientCredential, DomainInfo, Identity};
use crate::outputs::{self, Resolver};
use crate::parameters::{self, ParameterStore};
use crate::secrets::SecretStore;
use crate::values;

const DEFAULT_STACK_NAME: &str = "orders";

#[derive(Parser)]
#[command(name = "cfn-stack-tools")]
#[command(about = "Stack and SSM value helper tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// AWS region override
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stack helper commands
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },

    /// SSM value helper commands
    Values {
        #[command(subcommand)]
        command: ValuesCommands,
    },
}

#[derive(Subcommand)]
pub enum StackCommands {
    /// Show auth domain and client info for the stack
    Info {
        /// Stack name
        #[arg(short = 's', long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Cache stack outputs under this name (`.yaml` appended if bare)
        #[arg(short, long)]
        cache_name: Option<String>,

        /// Stack output key holding the client id
        #[arg(short = 'k', long, default_value = identity::DEFAULT_CLIENT_KEY)]
        client_key: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },

    /// Push or remove the client-credentials parameter
    Ssm {
        /// Stack name
        #[arg(short = 's', long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Stack output key holding the client id
        #[arg(short = 'k', long, default_value = identity::DEFAULT_CLIENT_KEY)]
        client_key: String,

        /// Parameter path prefix for client credentials
        #[arg(short, long, default_value = parameters::CLIENT_CREDS_BASE)]
        base: String,

        /// Remove instead of update
        #[arg(short, long)]
        remove: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Create or remove the Route53 alias for the user pool domain
    Route53 {
        /// Stack name
        #[arg(short = 's', long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Remove instead of update
        #[arg(short, long)]
        remove: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Export the API's OpenAPI document
    Swagger {
        /// Stack name
        #[arg(short = 's', long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,

        /// Extension type
        #[arg(short, long, value_enum, default_value = "none")]
        ext: ExportExtensions,

        /// Document format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ExportFormat,
    },

    /// Export the API's generated JavaScript client archive
    Sdk {
        /// Stack name
        #[arg(short = 's', long, default_value = DEFAULT_STACK_NAME)]
        stack_name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        directory: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum ValuesCommands {
    /// Show flat values from the local values file
    Show {
        /// Root key to scope the listing
        #[arg(short, long)]
        root: Option<String>,

        /// Show remote parameters instead, as nested YAML
        #[arg(long)]
        remote: bool,

        /// Values file
        #[arg(short, long, default_value = values::DEFAULT_VALUES_FILE)]
        file: PathBuf,
    },

    /// Update remote values under ROOT from the local values file
    Push {
        /// Root key; without it the available keys are listed
        root: Option<String>,

        /// Values file
        #[arg(short, long, default_value = values::DEFAULT_VALUES_FILE)]
        file: PathBuf,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Remove everything at or under KEY from remote
    Remove {
        /// Key prefix to remove
        key: String,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Create or update a secret in the secret store
    Secret {
        /// Secret name
        name: String,

        /// Secret value; read from stdin when omitted
        value: Option<String>,

        /// Description used when the secret is created
        #[arg(long, default_value = "")]
        description: String,

        /// Remove instead of update
        #[arg(short, long)]
        remove: bool,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Serialize)]
struct StackInfoReport {
    stack_name: String,
    auth_domain: DomainInfo,
    client: ClientCredential,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose)?;

    let sdk_config = load_sdk_config(cli.region).await;

    match cli.command {
        Commands::Stack { command } => handle_stack_command(command, &sdk_config).await,
        Commands::Values { command } => handle_values_command(command, &sdk_config).await,
    }
}

async fn load_sdk_config(region: Option<String>) -> SdkConfig {
    let region = region.map(Region::new);
    let region_provider = RegionProviderChain::first_try(region).or_default_provider();
    aws_config::from_env().region(region_provider).load().await
}

fn initialise_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", default_level);
    }

    if tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .is_err()
    {
        // Subscriber already set elsewhere (e.g. tests); ignore.
    }
    Ok(())
}

async fn handle_stack_command(
    command: StackCommands,
    sdk_config: &SdkConfig,
) -> anyhow::Result<()> {
    let resolver = Resolver::new(sdk_config);

    match command {
        StackCommands::Info { stack_name, cache_name, client_key, output } => {
            let cache = cache_name.as_deref().map(outputs::ensure_suffix);
            let stack_outputs = resolver.resolve(&stack_name, cache.as_deref()).await?;

            let identity = Identity::new(sdk_config);
            let auth_domain = identity.auth_domain(&stack_outputs).await?;
            let client = identity.client_credential(&stack_outputs, &client_key).await?;

            let report = StackInfoReport { stack_name, auth_domain, client };
            print_output(&report, output)?;
        }

        StackCommands::Ssm { stack_name, client_key, base, remove, yes } => {
            let policy = ConfirmPolicy::from_yes_flag(yes);
            let stack_outputs = resolver.fetch(&stack_name).await?;

            let identity = Identity::new(sdk_config);
            let credential = identity.client_credential(&stack_outputs, &client_key).await?;

            let store = ParameterStore::new(sdk_config);
            let name = parameters::client_credential_name(&base, &credential.name);

            if remove {
                println!("Removing SSM secret for {}", name);
                if policy.confirm("Continue?")? {
                    if store.delete(&name).await? {
                        println!("Removed {}", name);
                    } else {
                        println!("{} was already absent", name);
                    }
                }
            } else {
                println!("Setting SSM secret for {}", name);
                if policy.confirm("Continue?")? {
                    store.put_client_credential(&credential, &base).await?;
                    println!("Saved {}", name);
                }
            }
        }

        StackCommands::Route53 { stack_name, remove, yes } => {
            let policy = ConfirmPolicy::from_yes_flag(yes);
            let stack_outputs = resolver.fetch(&stack_name).await?;

            let identity = Identity::new(sdk_config);
            let domain = identity.auth_domain(&stack_outputs).await?;

            let action = if remove { AliasAction::Delete } else { AliasAction::Upsert };
            match action {
                AliasAction::Upsert => println!(
                    "Create A record alias: {} => {}",
                    domain.name, domain.distribution_alias
                ),
                AliasAction::Delete => println!("Delete A record alias: {}", domain.name),
            }

            if policy.confirm("Continue?")? {
                let dns = Dns::new(sdk_config);
                let status = dns.apply_alias(&domain, action).await?;
                println!("Submitted (status={})", status);
            }
        }

        StackCommands::Swagger { stack_name, directory, ext, format } => {
            let stack_outputs = resolver.fetch(&stack_name).await?;

            let export = ApiExport::new(sdk_config);
            let path = export
                .export_spec(&stack_outputs, &stack_name, &directory, format, ext)
                .await?;
            println!("Saved API spec: {}", path.display());
        }

        StackCommands::Sdk { stack_name, directory } => {
            let stack_outputs = resolver.fetch(&stack_name).await?;

            let export = ApiExport::new(sdk_config);
            let path = export.export_sdk(&stack_outputs, &stack_name, &directory).await?;
            println!("Saved client SDK archive: {}", path.display());
        }
    }

    Ok(())
}

async fn handle_values_command(
    command: ValuesCommands,
    sdk_config: &SdkConfig,
) -> anyhow::Result<()> {
    match command {
        ValuesCommands::Show { root, remote, file } => {
            if remote {
                let store = ParameterStore::new(sdk_config);
                let prefix = values::norm_key(root.as_deref().unwrap_or(""));
                let params = store.values_under(&prefix).await?;
                if params.is_empty() {
                    println!("No parameters under {}", prefix);
                    return Ok(());
                }

                let mut nested = Mapping::new();
                for (name, value) in &params {
                    if let Value::Mapping(single) =
                        values::nest(name, Value::String(value.clone()))
                    {
                        values::merge(&single, &mut nested);
                    }
                }
                print!("{}", serde_yaml::to_string(&nested)?);
            } else {
                let mapping = values::load(&file)?;
                let (_prefix, flat) = values::flat_under_root(&mapping, root.as_deref())?;

                println!(
                    "Values from {} ({}):\n",
                    file.display(),
                    root.as_deref().unwrap_or("[all]")
                );
                console::print_flat_values(&flat);
            }
        }

        ValuesCommands::Push { root, file, yes } => {
            let mapping = values::load(&file)?;
            let (_prefix, local) = values::flat_under_root(&mapping, root.as_deref())?;

            let root = match root {
                Some(root) => root,
                None => {
                    println!("Please specify a prefix:\n");
                    console::print_keys(local.keys().map(String::as_str));
                    return Ok(());
                }
            };

            let store = ParameterStore::new(sdk_config);
            let remote = store.values_under(&values::norm_key(&root)).await?;

            let plan = parameters::plan_sync(&local, &remote);
            if plan.is_empty() {
                println!("Nothing to do; remote matches local");
                return Ok(());
            }

            if !plan.to_put.is_empty() {
                println!("Add:\n");
                console::print_planned_puts(&plan.to_put);
            }
            if !plan.to_delete.is_empty() {
                println!("\nRemove:\n");
                console::print_keys(plan.to_delete.iter().map(String::as_str));
            }

            let policy = ConfirmPolicy::from_yes_flag(yes);
            if !policy.confirm("\nContinue?")? {
                println!("Cancelled");
                return Ok(());
            }

            let outcome = store.apply(&plan).await;
            println!(
                "\nAdded {}, removed {}",
                outcome.added.len(),
                outcome.removed.len()
            );
            if !outcome.failed.is_empty() {
                anyhow::bail!(
                    "{} keys failed: {}",
                    outcome.failed.len(),
                    outcome.failed.join(", ")
                );
            }
        }

        ValuesCommands::Remove { key, yes } => {
            let root = values::norm_key(&key);
            let store = ParameterStore::new(sdk_config);

            let names = store.names_under(&root).await?;
            if names.is_empty() {
                println!("No keys matching {}", root);
                return Ok(());
            }

            println!("\nRemove:\n");
            console::print_keys(names.iter().map(String::as_str));

            let policy = ConfirmPolicy::from_yes_flag(yes);
            if policy.confirm("\nContinue?")? {
                for name in &names {
                    match store.delete(name).await {
                        Ok(true) => println!("delete: {}", name),
                        Ok(false) => println!("delete: {} [missing]", name),
                        Err(error) => {
                            tracing::warn!(name = name.as_str(), %error, "delete failed")
                        }
                    }
                }
            }
        }

        ValuesCommands::Secret { name, value, description, remove, yes } => {
            let policy = ConfirmPolicy::from_yes_flag(yes);
            let store = SecretStore::new(sdk_config);

            if remove {
                println!("This will remove secret {}", name);
                if policy.confirm("Continue?")? {
                    store.delete(&name).await?;
                    println!("Removed {}", name);
                }
            } else {
                let value = console::value_or_stdin(value)?;
                if value.is_empty() {
                    anyhow::bail!("need a value for secret {}", name);
                }
                println!("This will set secret {}", name);
                if policy.confirm("Continue?")? {
                    store.upsert(&name, &description, &value).await?;
                    println!("Saved {}", name);
                }
            }
        }
    }

    Ok(())
}

fn print_output<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(data).context("Failed to serialize to YAML")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands, StackCommands, ValuesCommands};
    use crate::export::{ExportExtensions, ExportFormat};

    #[test]
    fn parses_stack_info_defaults() {
        let cli = Cli::parse_from(["cfn-stack-tools", "stack", "info"]);
        match cli.command {
            Commands::Stack { command: StackCommands::Info { stack_name, cache_name, client_key, .. } } => {
                assert_eq!(stack_name, "orders");
                assert_eq!(cache_name, None);
                assert_eq!(client_key, "TestClientId");
            }
            _ => panic!("Expected `stack info`"),
        }
    }

    #[test]
    fn parses_swagger_extension_variants() {
        let cli = Cli::parse_from([
            "cfn-stack-tools",
            "stack",
            "swagger",
            "-e",
            "aws-integrations",
            "--format",
            "json",
        ]);
        match cli.command {
            Commands::Stack { command: StackCommands::Swagger { ext, format, .. } } => {
                assert_eq!(ext, ExportExtensions::AwsIntegrations);
                assert_eq!(format, ExportFormat::Json);
            }
            _ => panic!("Expected `stack swagger`"),
        }
    }

    #[test]
    fn parses_values_push_root() {
        let cli = Cli::parse_from(["cfn-stack-tools", "values", "push", "app/db", "-y"]);
        match cli.command {
            Commands::Values { command: ValuesCommands::Push { root, yes, .. } } => {
                assert_eq!(root.as_deref(), Some("app/db"));
                assert!(yes);
            }
            _ => panic!("Expected `values push`"),
        }
    }

    #[test]
    fn global_region_flag() {
        let cli = Cli::parse_from([
            "cfn-stack-tools",
            "values",
            "show",
            "--region",
            "us-west-2",
        ]);
        assert_eq!(cli.region.as_deref(), Some("us-west-2"));
    }
}
