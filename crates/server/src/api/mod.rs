pub mod download;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod upscale;

pub use routes::create_router;
