pub mod handlers;
pub mod prompts;
pub mod runner;
pub mod skills;
pub mod store;
