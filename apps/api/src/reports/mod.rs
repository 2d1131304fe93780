// Match reports rendered as Word documents.

pub mod docx;
pub mod handlers;
