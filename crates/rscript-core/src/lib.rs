//! Core engine for RScript.
//!
//! This crate provides:
//! - Length-prefixed transport over local sockets and named pipes
//! - The combiner that merges a script folder into one compilation unit
//! - Compilation with `rustc` and isolated loading of the result
//! - The single-slot queue that hands jobs to the host UI thread
//! - Transaction handling and the host collaborator traits

pub mod combine;
pub mod compile;
pub mod error;
pub mod execute;
pub mod host;
pub mod queue;
pub mod result;
pub mod script;
pub mod server;
pub mod transaction;
pub mod transport;

pub use combine::{CombineError, CombineReport, CombinedUnit, Combiner, LineMap};
pub use compile::{Diagnostic, EngineConfig, HostReferences, ToolchainManager, UnitCompiler};
pub use error::{Error, Result};
pub use execute::{Engine, HostRunner, IsolatedContext, OutputSink, ScriptBindings};
pub use host::{
    Document, HostApplication, HostError, Transaction, TransactionStatus, UiDispatcher,
    UiDocument,
};
pub use queue::{Completion, ExecutionJob, ExecutionQueue, JobRunner, JobState, QueueError, Ticket};
pub use result::{ExecutionResult, ResultKind};
pub use script::ScriptFile;
pub use server::{CancelToken, ConnectionHandler, ScriptServer, ServerConfig};
pub use transaction::run_in_transaction;
pub use transport::{Endpoint, Request, TransportError};
