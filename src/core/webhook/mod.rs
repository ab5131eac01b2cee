//! Inbound webhook pipeline: authenticity, freshness, duplicate suppression,
//! event filtering and normalization, plus the axum listener hosting it.

pub mod dedup;
pub mod event;
pub mod processor;
pub mod server;
pub mod signature;
pub mod timestamp;

pub use dedup::DuplicateCache;
pub use event::{
    normalize, EntityKind, EventAction, EventType, NormalizedEvent, UnknownEventType, WebhookEvent,
};
pub use processor::{
    Clock, Disposition, RawDelivery, SystemClock, WebhookOutcome, WebhookProcessor,
    WebhookResponse,
};
pub use server::{
    serve_webhook, serve_webhook_with_ready_notifier, webhook_router, ChannelSink, EventSink,
    LogSink,
};
pub use signature::{compute_signature, signature_from_headers, verify_signature};
pub use timestamp::verify_timestamp;
