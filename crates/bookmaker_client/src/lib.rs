//! Clients for the two HTTP contracts around the Book Maker pipeline.
//!
//! - [`AdminApiClient`] speaks the admin gateway's `{action, table, ...}`
//!   protocol and unwraps its envelope.
//! - [`PipelineClient`] drives the pipeline backend (start/pause/resume/stop,
//!   single phases and agents).

pub mod admin;
pub mod pipeline;

pub use admin::{AdminApiClient, AdminApiError, CountMode, Filters, Row, SelectOptions, Selection};
pub use pipeline::{
    AgentInfo, AgentResult, Health, PhaseInfo, PipelineAck, PipelineClient, PipelineError,
    PipelineStatus, RunAgent, StartPipeline, DEFAULT_MODEL,
};
