//! Infrastructure layer: wire DTOs, the WebSocket transport and the HTTP
//! gateways implementing the domain traits.

pub mod dto;
pub mod http;
pub mod transport;
