pub mod company;
pub mod department;
pub mod filter_rule;
pub mod job;
pub mod matching;
pub mod registration;
pub mod report;
pub mod resume;
pub mod settings;
pub mod tenant;
pub mod user;
