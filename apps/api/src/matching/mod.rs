// Resume-to-job scoring: vector similarity, rule filter and LLM analysis
// fused into one 0..10 score.

pub mod analysis;
pub mod fusion;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod service;
