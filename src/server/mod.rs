pub mod api;
pub mod peer;
pub mod routes;
pub mod runtime;
pub mod state;

pub use state::AppState;
