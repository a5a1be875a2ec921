//! Core types and traits for the aisatsu durable workflow.
//!
//! This crate has no runtime dependency. It defines the data that crosses
//! the boundary between the workflow runtime and its durable substrate.
//!
//! # Core Types
//!
//! - [`WorkflowId`], [`HelloRequest`], [`HelloResponse`], [`Phase`] - execution data
//! - [`RetryPolicy`], [`ActivityOptions`] - remote call configuration
//! - [`RemoteCallResult`], [`ActivityFailure`] - classified attempt outcome
//! - [`HistoryEvent`] - durable record of an execution
//! - [`WorkflowError`] - error types
//!
//! # Substrate Traits
//!
//! - [`HistoryStore`] - append-only event history
//! - [`SearchAttributeIndex`] - externally queryable status index

mod activity;
mod error;
mod history;
mod retry;
mod traits;
mod types;

pub use activity::{ActivityFailure, RemoteCallResult};
pub use error::{ActivityError, ProjectionError, StoreError, WorkflowError};
pub use history::HistoryEvent;
pub use retry::{ActivityOptions, RetryPolicy, RetryPolicyError};
pub use traits::{ExecutionFilter, ExecutionInfo, HistoryStore, SearchAttributeIndex};
pub use types::{
    HelloRequest, HelloResponse, LanguageCode, ParseLanguageCodeError, ParsePhaseError, Phase,
    WorkflowId,
};
