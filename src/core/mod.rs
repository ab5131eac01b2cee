pub mod config;
pub mod error;
pub mod resources;
pub mod transport;
pub mod types;
pub mod webhook;

pub use config::{ConfigLoader, ConfigValidator, KommoConfig, WebhookConfig};
pub use error::AppError;
pub use resources::{BatchError, BatchItem, BatchRunner, OperationContext, OperationRegistry};
pub use transport::{Query, RequestDescriptor, Transport};
pub use types::*;
pub use webhook::{DuplicateCache, WebhookProcessor};
