mod client;
pub mod dto;

pub use client::{ApiClient, error_from_response, extract_message, parse_body};
