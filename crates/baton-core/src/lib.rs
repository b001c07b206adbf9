// Core domain types for the baton orchestrator
// This crate defines the execution/step/finding model, the continuation-token
// codec, and the content-provider seam. It has no database dependency.

pub mod content;
pub mod definition;
pub mod model;
pub mod token;

pub use content::{ContentError, ContentProvider, FsContentProvider, MemoryContentProvider};
pub use definition::{AgentDefinition, Complexity, Phase, WorkflowDefinition, WorkflowSummary};
pub use model::*;
pub use token::{TokenCodec, TokenError, TokenPayload};
