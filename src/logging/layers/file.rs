use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::{anyhow, bail, Context};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_NAME: &str = "kommo.log";

pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::DefaultFields, format::Format<format::Full>, BoxMakeWriter>;

pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

/// `kommo.log` inside the configured directory, or `.kommo/logs` under the
/// workspace (home directory when there is none).
pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let anchor = || -> Result<PathBuf> {
        match workspace_root {
            Some(workspace) => Ok(workspace.to_path_buf()),
            None => dirs_next::home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable")),
        }
    };
    let directory = match &config.log_dir {
        Some(custom) if custom.is_absolute() => custom.clone(),
        Some(custom) => {
            if custom.components().any(|part| matches!(part, Component::ParentDir)) {
                bail!("logging.log_dir must not leave the workspace: {}", custom.display());
            }
            anchor()?.join(custom)
        }
        None => anchor()?.join(".kommo").join("logs"),
    };
    Ok(directory.join(LOG_FILE_NAME))
}

/// Plain-text layer appending to `log_file`; a disabled sink discards output.
pub fn file_layer<S>(
    log_file: &Path,
    enabled: bool,
) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !enabled {
        return Ok((plain_layer(BoxMakeWriter::new(io::sink)), None));
    }
    if let Some(directory) = log_file.parent() {
        fs::create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    Ok((plain_layer(BoxMakeWriter::new(writer)), Some(guard)))
}

fn plain_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
}
