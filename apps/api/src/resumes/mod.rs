// Resume intake: upload validation, text extraction, LLM parsing and storage.

pub mod extract;
pub mod files;
pub mod handlers;
pub mod parser;
pub mod prompts;
