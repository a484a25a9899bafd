mod error;
mod handlers;
mod router;
mod serve;
mod types;

pub use router::handle_request;
pub use serve::serve;
pub use types::{AppState, Request};
