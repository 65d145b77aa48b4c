//! Agent runtime for the support router.
//!
//! Drives one inbound email through the routing graph:
//! 1. **Classify** (`classifier`) - label the email with the guardrail model
//! 2. **Respond / ExecuteTools** (`responder`, `tools`) - bounded tool-calling loop
//!    where every tool call passes the `guardrails::ToolPolicy` first
//! 3. **Validate** (`validator`) - check the draft before it leaves
//! 4. **Terminal action** (`runtime`) - dispatch, escalate, or canned reply
//!
//! The model only drafts text and requests lookups. Which records it may see,
//! and where the case ends up, is decided here.

pub mod classifier;
pub mod extract;
pub mod guardrails;
pub mod llm;
pub mod prompts;
pub mod providers;
pub mod responder;
pub mod runtime;
pub mod tools;
pub mod validator;

pub use classifier::{Classifier, LlmClassifier};
pub use guardrails::{ToolDecision, ToolPolicy};
pub use llm::{Completion, CompletionRequest, LlmClient, LlmError, StopReason, ToolSpec};
pub use prompts::PromptBook;
pub use responder::{LlmResponder, Responder, ResponderOutput};
pub use runtime::{AgentRuntime, RuntimeSettings};
pub use tools::{ToolExecutor, ToolName, ToolRequest, ToolRound};
pub use validator::{LlmValidator, ReplyValidator};
