// Tenant screening rules and their evaluation against parsed resumes.

pub mod engine;
pub mod handlers;
