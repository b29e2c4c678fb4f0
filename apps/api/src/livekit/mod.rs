pub mod cache;
pub mod egress;
pub mod handlers;
pub mod token;
pub mod webhook;
