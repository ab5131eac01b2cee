use crate::{
    cli::args::{RequestArgs, RunArgs, ServeArgs, SignArgs},
    core::{
        config::loader::CONFIG_FILE_NAME,
        resources::{BatchItem, BatchRunner, OperationContext, OperationRegistry},
        transport::{Query, Transport},
        webhook::{compute_signature, serve_webhook, LogSink, WebhookProcessor},
        ConfigLoader, ConfigValidator, KommoConfig,
    },
    Result,
};
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::{
    env, fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Resolve `--workspace`, defaulting to the current directory.
pub fn workspace_path(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path.to_path_buf()),
        None => env::current_dir().context("failed to determine current directory"),
    }
}

/// Load `kommo.toml` (or `--config`) with `KOMMO_*` overrides applied.
pub fn load_config(workspace: &Path, config: Option<&Path>) -> Result<KommoConfig> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| workspace.join(CONFIG_FILE_NAME));
    if config.is_some() && !path.exists() {
        return Err(anyhow!("config file {} does not exist", path.display()));
    }
    Ok(ConfigLoader::load(&path)?)
}

pub async fn request(args: RequestArgs, config: KommoConfig) -> Result<()> {
    let transport = Transport::from_config(&config)?;
    let query: Query = args.query.into_iter().collect();
    let output = if args.all {
        let pages = transport
            .request_all_pages(args.method, &args.endpoint, args.body.as_ref(), &query)
            .await?;
        Value::Array(pages)
    } else {
        transport
            .request(args.method, &args.endpoint, args.body.as_ref(), &query)
            .await?
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn run(args: RunArgs, config: KommoConfig) -> Result<()> {
    let items = match (&args.items, &args.resource) {
        (Some(path), _) => read_items(path)?,
        (None, Some(resource)) => vec![BatchItem::new(
            resource.clone(),
            args.operation.as_deref(),
            args.params.clone().unwrap_or_else(|| Value::Object(Default::default())),
        )],
        (None, None) => return Err(anyhow!("either --items or --resource is required")),
    };

    let transport = Transport::from_config(&config)?;
    let runner = BatchRunner::new(
        OperationRegistry::with_builtins(),
        OperationContext::new(transport),
    );
    let results = runner.run_batch(items, args.continue_on_fail).await?;

    let mut stdout = std::io::stdout().lock();
    let mut failed = 0usize;
    for result in &results {
        if !result.is_success() {
            failed += 1;
        }
        for record in result.to_records() {
            writeln!(stdout, "{}", serde_json::to_string(&record)?)?;
        }
    }
    stdout.flush()?;
    tracing::info!(items = results.len(), failed, "batch finished");
    Ok(())
}

fn read_items(path: &Path) -> Result<Vec<BatchItem>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read items file {}", path.display()))?;
    let items: Vec<BatchItem> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse items file {}", path.display()))?;
    if items.is_empty() {
        return Err(anyhow!("items file {} contains no items", path.display()));
    }
    Ok(items)
}

pub async fn webhook_serve(args: ServeArgs, mut config: KommoConfig) -> Result<()> {
    if let Some(bind) = args.bind {
        config.webhook.bind = bind;
    }
    if let Some(path) = args.path {
        config.webhook.path = path;
    }
    ConfigValidator::validate(&config)?;
    let processor = WebhookProcessor::from_config(&config.webhook)?;
    serve_webhook(&config.webhook, processor, Arc::new(LogSink)).await?;
    Ok(())
}

pub fn webhook_sign(args: SignArgs) -> Result<()> {
    let body = match (args.body, args.body_file) {
        (Some(body), _) => body.into_bytes(),
        (None, Some(path)) => fs::read(&path)
            .with_context(|| format!("failed to read body file {}", path.display()))?,
        (None, None) => return Err(anyhow!("either --body or --body-file is required")),
    };
    println!("{}", compute_signature(&body, &args.secret)?);
    Ok(())
}

pub fn operations() -> Result<()> {
    let registry = OperationRegistry::with_builtins();
    for (resource, operation) in registry.operations() {
        println!("{}.{}", resource, operation);
    }
    Ok(())
}
