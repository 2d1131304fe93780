// Job positions: lifecycle, LLM-derived profiles and embeddings.

pub mod handlers;
pub mod profile;
pub mod prompts;
