use serde::Serialize;

use crate::shared::response::types::StatusCode;

/// `{"status": <code>, "message": "..."}` followed by a newline.
pub fn response_error_bytes(status: StatusCode, message: &str) -> Vec<u8> {
    let payload = serde_json::json!({
        "status": status.code(),
        "message": message,
    });
    let mut buf = Vec::new();
    if serde_json::to_writer(&mut buf, &payload).is_err() {
        buf.clear();
        buf.extend_from_slice(br#"{"status":500,"message":"Failed to serialize"}"#);
    }
    buf.push(b'\n');
    buf
}

pub fn to_json_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    if serde_json::to_writer(&mut buf, value).is_err() {
        return response_error_bytes(StatusCode::InternalError, "Failed to serialize response");
    }
    buf.push(b'\n');
    buf
}
