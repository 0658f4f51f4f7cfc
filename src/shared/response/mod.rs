pub mod arrow;
pub mod json;
pub mod types;

pub use types::StatusCode;

pub use arrow::{ArrowStreamEncoder, FrameStream, encode_stream};
pub use json::response_error_bytes;

#[cfg(test)]
mod arrow_test;
