pub mod extractor;
pub mod workflow;

pub use extractor::{extract_positive_prompt, ExtractError};
