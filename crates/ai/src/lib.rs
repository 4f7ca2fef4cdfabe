//! `docket-ai`
//!
//! **Responsibility:** boundary to the generative-text capability.
//!
//! This crate is intentionally **not** part of the job store or worker:
//! - It must not depend on storage or queues.
//! - It describes prompts (stages), invokes a `TextGenerator`, and parses output.
//! - Concrete HTTP clients live in infra.

pub mod checklist;
pub mod error;
pub mod generator;
pub mod stage;

pub use checklist::parse_checklist;
pub use error::AiError;
pub use generator::{ChatMessage, ChatRole, TextGenerator};
pub use stage::{Pipeline, PipelineStage, StageKind};
