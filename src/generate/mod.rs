pub mod client;
pub mod prompts;
pub mod refine;
pub mod strategies;
pub mod trace;

#[cfg(test)]
pub(crate) mod fake;

pub use client::{GroqClient, TextGenerator};
pub use prompts::PromptSet;
pub use refine::{refine, ChatOutcome};
pub use strategies::{ContentWriter, DocumentContext, Outcome, Written};
pub use trace::TraceWriter;
