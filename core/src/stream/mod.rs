mod event;
mod parser;

pub use event::StreamEvent;
pub use parser::{StreamParser, MAX_LINE_BYTES};
