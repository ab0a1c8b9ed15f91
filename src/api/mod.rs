pub mod direct;
pub mod handlers;
pub mod routes;

pub use routes::{app, AppState};
