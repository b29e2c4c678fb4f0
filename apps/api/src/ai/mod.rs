pub mod evaluate;
pub mod handlers;
pub mod prompts;
pub mod questions;
