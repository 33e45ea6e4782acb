pub mod terminal;
pub mod web;
