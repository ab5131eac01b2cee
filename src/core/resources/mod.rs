//! Kommo REST resources: the `(resource, operation)` table, the shared
//! parameter conventions and the batch runner that drives them.

pub mod batch;
pub mod builtins;
pub mod custom_fields;
pub mod dates;
pub mod entities;
pub mod params;
pub mod purchases;
pub mod registry;
pub mod unsorted;

pub use batch::{BatchError, BatchItem, BatchRunner, ItemOutcome, ItemResult};
pub use builtins::register_builtins;
pub use entities::{shape_response, ListEntities, WriteEntities, DEFAULT_LIST_LIMIT};
pub use registry::{
    default_operation, OperationContext, OperationRegistry, OperationRegistryBuilder,
    ResourceOperation,
};
