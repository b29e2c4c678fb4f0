pub mod enhance;
pub mod extract;
pub mod handlers;
pub mod prompts;
pub mod store;
