pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod mcp;
pub mod tools;
