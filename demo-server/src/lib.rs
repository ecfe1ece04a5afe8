//! Minimal MCP server used to exercise the hub end to end.

mod server;

pub use server::{DemoServer, ECHO_TEMPLATE, SERVER_NAME};
