// MCP servers, transports and the remote tool client.

pub mod client;
pub mod files;
pub mod serve;
pub mod session;
pub mod social;
pub mod weather;

pub use rmcp::model::ErrorData as McpError;
