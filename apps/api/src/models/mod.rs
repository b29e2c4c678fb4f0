pub mod analytics;
pub mod billing;
pub mod challenge;
pub mod cv;
pub mod integration;
pub mod interview;
pub mod notification;
pub mod recording;
pub mod user;
