pub mod handlers;
pub mod plans;
pub mod stripe;
pub mod usage;
pub mod webhook;
