mod parser;
mod types;

pub use parser::{parse_batch, to_batch_text};
pub use types::{ReasoningEffort, TaskSpec};
