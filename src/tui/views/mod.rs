pub mod browse;
pub mod chat;
pub mod upload;
