pub mod handlers;
pub mod storage;
