//! # Stagehand
//!
//! Resumable, multi-process-safe checkpointing for long-running provisioning
//! pipelines.
//!
//! ## Usage
//!
//! ```bash
//! stagehand status show
//! stagehand run --hub admin@hub --sub-env admin@org --level sub-env --key created \
//!     -- sfdx force:org:create --json
//! ```
//!
//! ## Modules
//!
//! - `storage` - Checkpoint store: hierarchical status document behind a cross-process lock
//! - `stage` - Resumable stages that skip work already recorded as done
//! - `retry` - Retry driver that classifies external failures and drives commands to completion
//! - `wait` - Fixed-interval bounded polling
//! - `subprocess` - Process runner and JSON-envelope command adapters
//! - `config` - Layered configuration (defaults, TOML, environment)
//! - `error` - Unified error type with numeric codes and serializable failure records
//! - `testing` - Scripted collaborators for tests
pub mod config;
pub mod error;
pub mod retry;
pub mod stage;
pub mod storage;
pub mod subprocess;
pub mod wait;

pub mod testing;

pub use error::{ErrorCode, ErrorRecord, Result, StagehandError};
pub use stage::{Completion, StageRunner};
pub use storage::{CheckpointStore, FieldValue, Identity, Level};
