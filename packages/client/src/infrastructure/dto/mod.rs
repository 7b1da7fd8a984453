//! Data Transfer Objects (DTOs) for the chat client.
//!
//! DTOs are organized by protocol:
//! - `websocket`: socket event DTOs for the three channels
//! - `http`: HTTP API request/response DTOs
//!
//! `conversion` maps DTOs to and from domain models.

pub mod conversion;
pub mod http;
pub mod websocket;
