pub mod client_ip;
pub mod handlers;
pub mod routes;
pub mod ua;

pub use routes::create_redirect_router;
