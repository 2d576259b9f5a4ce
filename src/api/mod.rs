pub mod websocket;

pub use websocket::*;
