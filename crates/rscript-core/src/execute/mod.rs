//! Loading and running compiled scripts.
//!
//! # Architecture
//!
//! ```text
//! ExecutionJob
//!     │
//!     └── HostRunner (UI thread, resolves the active document)
//!             │
//!             └── Engine::compile_and_run
//!                     │
//!                     ├── Combiner → UnitCompiler → cdylib
//!                     │
//!                     └── IsolatedContext (job directory + loaded library)
//!                             │
//!                             └── rscript_entry(&HostApi) → HostSession callbacks
//! ```

mod abi;
mod context;
mod engine;
mod output;
mod runner;

pub use abi::{ABI_VERSION, EntryFn, HostApi, HostSession, ScriptFailure};
pub use context::IsolatedContext;
pub use engine::{Engine, ScriptBindings};
pub use output::{FrameSink, OutputSink};
pub use runner::HostRunner;
