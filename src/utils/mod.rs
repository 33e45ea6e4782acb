pub mod fs;
pub mod security;
