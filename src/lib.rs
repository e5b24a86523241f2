//! # insight-rs
//!
//! A multi-agent retrieval orchestrator for investment questions.
//!
//! A question is classified as simple or complex. Simple questions get a
//! direct answer grounded in the user's stored context. Complex questions
//! are decomposed into sub-queries, each routed to a document, news, graph
//! or web collaborator; evidence is gathered concurrently, judged for
//! sufficiency (with bounded refinement), integrated with the user's
//! profile and holdings, and written up as a markdown report that is
//! persisted as a searchable insight.
//!
//! ## Example
//!
//! ```no_run
//! use insight_rs::{AgentConfig, Container, Orchestrator, SqliteStore};
//!
//! # async fn run() -> insight_rs::Result<()> {
//! let config = AgentConfig::builder().from_env().build()?;
//! let store = SqliteStore::open(std::path::Path::new(".insight/insight.db"))?;
//! store.init()?;
//! let container = Container::from_config(&config, store)?;
//! let orchestrator = Orchestrator::new(container, config);
//! let report = orchestrator.process("삼성전자 투자해도 될까요?", "alice", "s1").await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod container;
pub mod core;
pub mod error;
pub mod storage;
pub mod tools;

pub use agent::{AgentConfig, Orchestrator, ProgressEvent, WorkflowOutcome, WorkflowStep};
pub use container::Container;
pub use error::{AgentError, CommandError, Error, Result, StorageError};
pub use storage::{InsightStore, MemoryStore, SqliteStore};
pub use tools::{ToolAdapter, ToolRegistry};
