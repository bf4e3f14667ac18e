//! HTTP/WebSocket service surface

mod http;
mod websocket;

pub use http::{run, AppState};
