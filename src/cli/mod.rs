pub mod args;
pub mod commands;

pub use args::{RequestArgs, RunArgs, ServeArgs, SignArgs, WebhookArgs, WebhookCommand};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "kommo")]
#[command(version = crate::VERSION)]
#[command(about = "Kommo CRM integration: REST operations and verified webhook ingestion")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Configuration is read from {workspace}/kommo.toml and KOMMO_* environment variables."
)]
pub struct Args {
    /// Directory containing kommo.toml (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    /// Explicit config file (default: {workspace}/kommo.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Send one authenticated request to the REST API",
        long_about = "Request resolves the tenant base URL, attaches the access token and prints the decoded response. With --all every page is fetched.",
        after_help = "Example:\n    kommo request GET leads -q limit=50 -q 'filter={\"statuses\":[142]}' --all"
    )]
    Request(RequestArgs),
    #[command(
        about = "Execute resource operations",
        long_about = "Run executes items against the operation table in order and prints one JSON record per output line.",
        after_help = "Examples:\n    kommo run --items items.json --continue-on-fail\n    kommo run --resource leads --params '{\"returnAll\": true}'"
    )]
    Run(RunArgs),
    #[command(about = "Serve or sign webhook deliveries")]
    Webhook(WebhookArgs),
    #[command(about = "List the registered resource operations")]
    Operations,
}

pub async fn run(args: Args) -> crate::Result<()> {
    let workspace = commands::workspace_path(args.workspace.as_deref())?;
    let config_path = args.config.clone();
    let load = || commands::load_config(&workspace, config_path.as_deref());
    match args.command {
        Command::Request(request_args) => commands::request(request_args, load()?).await,
        Command::Run(run_args) => commands::run(run_args, load()?).await,
        Command::Webhook(WebhookArgs {
            command: WebhookCommand::Serve(serve_args),
        }) => commands::webhook_serve(serve_args, load()?).await,
        Command::Webhook(WebhookArgs {
            command: WebhookCommand::Sign(sign_args),
        }) => commands::webhook_sign(sign_args),
        Command::Operations => commands::operations(),
    }
}
