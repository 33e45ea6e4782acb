pub mod common;
pub mod receive;
pub mod send;
pub mod server;
pub mod session;
pub mod ui;
pub mod utils;
