//! Answer generation with grounded prompts and citation handling

mod chain;
pub mod citation;
pub mod prompt;

pub use chain::{validate_question, QueryChain};
pub use citation::{build_citations, mark_cited, truncate_snippet};
pub use prompt::{BuiltPrompt, PromptBuilder};
