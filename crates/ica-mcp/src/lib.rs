//! MCP (Model Context Protocol) server: JSON-RPC dispatch plus the
//! streamable HTTP and stdio transports.

pub mod http;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stdio;

pub use server::McpServer;
