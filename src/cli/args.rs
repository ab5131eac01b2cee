use crate::core::transport::{parse_query_pair, ParseQueryError};
use clap::Args;
use reqwest::Method;
use serde_json::Value;
use std::path::PathBuf;

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|err| format!("invalid HTTP method '{}': {}", raw, err))
}

fn parse_json(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(raw)
}

fn parse_query_arg(raw: &str) -> Result<(String, Value), ParseQueryError> {
    parse_query_pair(raw)
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PATCH, DELETE)
    #[arg(value_name = "METHOD", value_parser = parse_method)]
    pub method: Method,

    /// Endpoint relative to the API base, e.g. `leads` or `catalogs/7/elements`
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: String,

    /// JSON request body
    #[arg(long, value_name = "JSON", value_parser = parse_json)]
    pub body: Option<Value>,

    /// Query parameter; JSON values keep their type (repeatable)
    #[arg(long = "query", short = 'q', value_name = "KEY=VALUE", value_parser = parse_query_arg)]
    pub query: Vec<(String, Value)>,

    /// Follow `_links.next` and print every page
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON file holding an array of `{resource, operation, params}` items
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["resource", "operation", "params"],
        required_unless_present = "resource"
    )]
    pub items: Option<PathBuf>,

    /// Resource of a single item (e.g. leads)
    #[arg(long, value_name = "RESOURCE")]
    pub resource: Option<String>,

    /// Operation of a single item; defaults to the resource's read operation
    #[arg(long, value_name = "OPERATION", requires = "resource")]
    pub operation: Option<String>,

    /// Parameters of a single item as a JSON object
    #[arg(long, value_name = "JSON", value_parser = parse_json, requires = "resource")]
    pub params: Option<Value>,

    /// Record failed items and keep going instead of aborting
    #[arg(long)]
    pub continue_on_fail: bool,
}

#[derive(Args, Debug)]
pub struct WebhookArgs {
    #[command(subcommand)]
    pub command: WebhookCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum WebhookCommand {
    #[command(
        about = "Run the webhook listener",
        long_about = "Serve accepts Kommo deliveries, verifies them and prints every accepted event as one JSON line on stdout.",
        after_help = "Example:\n    kommo webhook serve --bind 0.0.0.0:8080"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Compute the signature Kommo would send for a body",
        after_help = "Example:\n    kommo webhook sign --secret s3cr3t --body '{\"event_type\":\"lead_added\"}'"
    )]
    Sign(SignArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address overriding `webhook.bind`
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Route path overriding `webhook.path`
    #[arg(long, value_name = "PATH")]
    pub path: Option<String>,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Shared webhook secret
    #[arg(long, value_name = "SECRET")]
    pub secret: String,

    /// Raw body to sign
    #[arg(long, value_name = "BODY", conflicts_with = "body_file", required_unless_present = "body_file")]
    pub body: Option<String>,

    /// File whose bytes are signed
    #[arg(long, value_name = "FILE")]
    pub body_file: Option<PathBuf>,
}
