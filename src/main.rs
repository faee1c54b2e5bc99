use anyhow::{Context, Result, bail};
use clap::Parser;
use primary_proxy::cli::{build_request, parse_payload, render_response};
use primary_proxy::http::RetryPolicy;
use primary_proxy::proxy::{CapturedRequest, InboundRequest, OutboundResponse};
use primary_proxy::{PrimaryClient, ProxyConfig};
use reqwest::Method;
use std::time::Duration;

/// primary-proxy - forward primary-only API calls to the primary instance
///
/// Sends one request to `{api-url}/api/{api-version}/{path}` the same way a
/// worker instance forwards requests it cannot serve itself, and prints the
/// translated response.
///
/// Examples:
///   primary-proxy --api-url http://primary:8080 background-task my-task
///   primary-proxy --api-url http://primary:8080 trigger-migrations
#[derive(Parser, Debug)]
#[command(author, version = env!("PRIMARY_PROXY_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the primary instance
    #[arg(
        long = "api-url",
        env = "PRIMARY_API_URL",
        value_name = "URL",
        global = true
    )]
    api_url: Option<String>,

    /// API version segment
    #[arg(
        long = "api-version",
        env = "PRIMARY_API_VERSION",
        default_value = "v1",
        global = true
    )]
    api_version: String,

    /// Maximum pooled connections to the primary
    #[arg(
        long = "max-workers",
        env = "PRIMARY_MAX_WORKERS",
        default_value_t = 64,
        global = true
    )]
    max_workers: usize,

    /// Request timeout in seconds
    #[arg(
        long = "timeout",
        env = "PRIMARY_TIMEOUT_SECS",
        default_value_t = 20,
        global = true
    )]
    timeout: u64,

    /// Retries for connection failures
    #[arg(long = "retries", default_value_t = 3, global = true)]
    retries: usize,

    /// Backoff factor between retries, in milliseconds
    #[arg(long = "backoff-ms", default_value_t = 1000, global = true)]
    backoff_ms: u64,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Forward an arbitrary request
    Forward(ForwardArgs),

    /// Get a background task
    BackgroundTask {
        name: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Trigger database migrations
    TriggerMigrations {
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Create a schedule
    CreateSchedule {
        project: String,
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        body: BodyArgs,
    },

    /// Update a schedule
    UpdateSchedule {
        project: String,
        name: String,
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        body: BodyArgs,
    },

    /// Delete a schedule
    DeleteSchedule {
        project: String,
        name: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Delete all schedules of a project
    DeleteSchedules {
        project: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Invoke a schedule now
    InvokeSchedule {
        project: String,
        name: String,
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Submit a job
    SubmitJob {
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        body: BodyArgs,
    },

    /// Build a function
    BuildFunction {
        #[command(flatten)]
        context: ContextArgs,
        #[command(flatten)]
        body: BodyArgs,
    },

    /// Delete a project
    DeleteProject {
        name: String,
        #[command(flatten)]
        context: ContextArgs,
    },
}

/// Caller context copied onto the forwarded request.
#[derive(clap::Args, Debug, Default)]
struct ContextArgs {
    /// Header to forward, as 'Name: value' (repeatable)
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    headers: Vec<String>,

    /// Query parameter to forward, as 'key=value' (repeatable)
    #[arg(long = "query", short = 'q', value_name = "PAIR")]
    query: Vec<String>,

    /// Cookie to forward, as 'name=value' (repeatable)
    #[arg(long = "cookie", short = 'b', value_name = "PAIR")]
    cookies: Vec<String>,
}

impl ContextArgs {
    fn request(&self) -> Result<Option<CapturedRequest>> {
        build_request(&self.headers, &self.query, &self.cookies)
    }
}

#[derive(clap::Args, Debug)]
struct BodyArgs {
    /// JSON object to send as the request body
    #[arg(long = "body", short = 'd', value_name = "JSON")]
    body: String,
}

#[derive(clap::Args, Debug)]
struct ForwardArgs {
    /// HTTP method
    #[arg(value_name = "METHOD")]
    method: String,

    /// Path below /api/{version}/
    #[arg(value_name = "PATH")]
    path: String,

    #[command(flatten)]
    context: ContextArgs,

    /// JSON object to send as the request body
    #[arg(long = "body", short = 'd', value_name = "JSON")]
    body: Option<String>,

    /// Fail with the primary's error instead of printing its response
    #[arg(long = "raise")]
    raise: bool,
}

impl Cli {
    fn config(&self) -> Result<ProxyConfig> {
        let api_url = self
            .api_url
            .clone()
            .context("The primary API URL is required (--api-url or PRIMARY_API_URL)")?;

        Ok(ProxyConfig::new(api_url)
            .with_api_version(self.api_version.clone())
            .with_max_workers(self.max_workers)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_retry(RetryPolicy {
                total: self.retries,
                backoff_factor: Duration::from_millis(self.backoff_ms),
            }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let client = PrimaryClient::init_global(&cli.config()?).await?;

    let response = run(client, cli.command).await?;
    print!("{}", render_response(&response));
    println!();

    if response.status.as_u16() >= 400 {
        bail!("Primary responded with {}", response.status);
    }
    Ok(())
}

async fn run(client: &PrimaryClient, command: Commands) -> Result<OutboundResponse> {
    let response = match command {
        Commands::Forward(args) => {
            let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method '{}'", args.method))?;
            let request = args.context.request()?;
            let body = args.body.as_deref().map(parse_payload).transpose()?;
            let inbound = request.as_ref().map(|r| r as &dyn InboundRequest);

            if args.raise {
                let result = client.forward(method, &args.path, inbound, body, true).await?;
                OutboundResponse::from(result)
            } else {
                client.proxy(method, &args.path, inbound, body).await
            }
        }
        Commands::BackgroundTask { name, context } => {
            let request = context.request()?;
            client
                .get_background_task(&name, request.as_ref().map(|r| r as &dyn InboundRequest))
                .await
        }
        Commands::TriggerMigrations { context } => {
            let request = context.request()?;
            client
                .trigger_migrations(request.as_ref().map(|r| r as &dyn InboundRequest))
                .await
        }
        Commands::CreateSchedule {
            project,
            context,
            body,
        } => {
            let request = context.request()?.unwrap_or_default();
            client
                .create_schedule(&project, &request, parse_payload(&body.body)?)
                .await
        }
        Commands::UpdateSchedule {
            project,
            name,
            context,
            body,
        } => {
            let request = context.request()?.unwrap_or_default();
            client
                .update_schedule(&project, &name, &request, parse_payload(&body.body)?)
                .await
        }
        Commands::DeleteSchedule {
            project,
            name,
            context,
        } => {
            let request = context.request()?.unwrap_or_default();
            client.delete_schedule(&project, &name, &request).await
        }
        Commands::DeleteSchedules { project, context } => {
            let request = context.request()?.unwrap_or_default();
            client.delete_schedules(&project, &request).await
        }
        Commands::InvokeSchedule {
            project,
            name,
            context,
        } => {
            let request = context.request()?.unwrap_or_default();
            client.invoke_schedule(&project, &name, &request).await
        }
        Commands::SubmitJob { context, body } => {
            let request = context.request()?.unwrap_or_default();
            client.submit_job(&request, parse_payload(&body.body)?).await
        }
        Commands::BuildFunction { context, body } => {
            let request = context.request()?.unwrap_or_default();
            client
                .build_function(&request, parse_payload(&body.body)?)
                .await
        }
        Commands::DeleteProject { name, context } => {
            let request = context.request()?.unwrap_or_default();
            client.delete_project(&name, &request).await
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_forward_parsing() {
        let cli = Cli::try_parse_from([
            "primary-proxy",
            "--api-url",
            "http://primary:8080",
            "forward",
            "post",
            "submit_job",
            "-H",
            "X-A: 1",
            "--query",
            "k=v",
            "--body",
            r#"{"a": 1}"#,
            "--raise",
        ])
        .unwrap();

        assert_eq!(cli.api_url.as_deref(), Some("http://primary:8080"));
        match cli.command {
            Commands::Forward(args) => {
                assert_eq!(args.method, "post");
                assert_eq!(args.path, "submit_job");
                assert_eq!(args.context.headers, vec!["X-A: 1"]);
                assert_eq!(args.context.query, vec!["k=v"]);
                assert_eq!(args.body.as_deref(), Some(r#"{"a": 1}"#));
                assert!(args.raise);
            }
            _ => panic!("Expected Forward command"),
        }
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["primary-proxy", "trigger-migrations"]).unwrap();
        assert_eq!(cli.api_version, "v1");
        assert_eq!(cli.max_workers, 64);
        assert_eq!(cli.timeout, 20);
        assert_eq!(cli.retries, 3);
        assert_eq!(cli.backoff_ms, 1000);
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "primary-proxy",
            "delete-schedule",
            "proj",
            "nightly",
            "--api-url",
            "http://p",
            "--api-version",
            "v2",
        ])
        .unwrap();

        assert_eq!(cli.api_version, "v2");
        match cli.command {
            Commands::DeleteSchedule { project, name, .. } => {
                assert_eq!(project, "proj");
                assert_eq!(name, "nightly");
            }
            _ => panic!("Expected DeleteSchedule command"),
        }
    }

    #[test]
    fn test_cli_body_required_for_submit_job() {
        let result = Cli::try_parse_from(["primary-proxy", "submit-job"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_cli() {
        let cli = Cli::try_parse_from([
            "primary-proxy",
            "--api-url",
            "http://primary/",
            "--timeout",
            "3",
            "--retries",
            "0",
            "background-task",
            "t",
        ])
        .unwrap();

        let config = cli.config().unwrap();
        assert_eq!(config.normalized_api_url(), "http://primary");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.retry.total, 0);
    }
}
