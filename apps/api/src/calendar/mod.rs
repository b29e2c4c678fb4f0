pub mod google;
pub mod handlers;
pub mod sync;
pub mod tokens;
