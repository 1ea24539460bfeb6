//! Query agent, batch runner, configuration and bootstrap for lorebase.

pub mod agent;
pub mod batch;
pub mod bootstrap;
pub mod config;

pub use agent::{AgentAnswer, AgentError, IntermediateStep, QueryAgent};
pub use batch::{BatchQueryRunner, BatchSummary};
pub use config::{Config, ConfigError};
