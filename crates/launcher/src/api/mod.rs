//! HTTP shell over the launch coordinator.

pub mod errors;
pub mod handlers;
pub mod server;

pub use errors::ApiError;
pub use server::routes;
pub use server::ApiServer;
