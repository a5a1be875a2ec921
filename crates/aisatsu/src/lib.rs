//! A durable, signal-driven greeting workflow for Rust.
//!
//! An execution greets a person in the language they choose. Without a
//! language in its input it waits for one to be signalled, then calls a
//! translation activity under a retry policy and returns `"<word> <name> !"`.
//! Every decision is recorded in a history, so a new worker replays an
//! unfinished execution to where it stopped without calling the activity or
//! publishing its status again.
//!
//! # Example
//!
//! ```rust,no_run
//! use aisatsu::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), WorkflowError> {
//!     let registry = WorkflowRegistry::builder().build()?;
//!
//!     let id = registry.start(HelloRequest::new("Ada", None)).await?;
//!     registry.signal_language(&id, LanguageCode::Fr).await?;
//!     let response = registry.handle(&id).await?.result().await?;
//!     println!("{}", response.message);
//!     Ok(())
//! }
//! ```

mod activity;
mod context;
mod invoker;
mod options;
mod projector;
mod registry;
mod store;
mod workflow;

// Re-export core types
pub use aisatsu_core::*;

pub use activity::{ActivityContext, HelloTranslationActivity, TranslationActivity, TRANSLATE_HELLO};
pub use context::WorkflowContext;
pub use invoker::{RemoteCallInvoker, START_TO_CLOSE_TIMEOUT};
pub use options::{WorkerOptions, DEFAULT_ACTIVITY_TASK_QUEUE, DEFAULT_WORKFLOW_TASK_QUEUE};
pub use projector::{StatusProjector, STATUS_SEARCH_ATTRIBUTE};
pub use registry::{RecoveryReport, WorkflowHandle, WorkflowRegistry, WorkflowRegistryBuilder};
pub use store::{InMemoryHistoryStore, InMemorySearchAttributeIndex};
pub use workflow::HelloWorkflow;

pub use tokio_util::sync::CancellationToken;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        ActivityContext, ActivityError, ActivityOptions, ExecutionFilter, HelloRequest,
        HelloResponse, HelloTranslationActivity, LanguageCode, Phase, RecoveryReport,
        RemoteCallResult, RetryPolicy, TranslationActivity, WorkerOptions, WorkflowError,
        WorkflowHandle, WorkflowId, WorkflowRegistry,
    };
}
