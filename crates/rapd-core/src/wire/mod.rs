//! Marker-framed JSON, the wire format between control processes and launchers.
//!
//! A message is the JSON text of a payload wrapped as `<rapd_start>{...}<rapd_end>` and
//! written to a plain TCP stream. There is no length header and no checksum: a receiver keeps
//! reading until it has seen both markers, then parses what lies between them.

mod decoder;
pub use decoder::FrameDecoder;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const START_MARKER: &str = "<rapd_start>";
pub const END_MARKER: &str = "<rapd_end>";

/// Largest frame body a receiver buffers before giving up on the connection.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode frame body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("frame has no start marker")]
    MissingStart,

    #[error("frame has no end marker")]
    MissingEnd,

    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },

    #[error("frame body is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Encode `payload` as JSON and wrap it in the start/end markers.
pub fn frame<T: Serialize + ?Sized>(payload: &T) -> Result<String, WireError> {
    let json = serde_json::to_string(payload).map_err(WireError::Encode)?;
    let mut out = String::with_capacity(START_MARKER.len() + json.len() + END_MARKER.len());
    out.push_str(START_MARKER);
    out.push_str(&json);
    out.push_str(END_MARKER);
    Ok(out)
}

/// Body between the first start marker and the end marker that follows it.
pub fn unframe(text: &str) -> Result<&str, WireError> {
    let start = text.find(START_MARKER).ok_or(WireError::MissingStart)? + START_MARKER.len();
    let len = text[start..].find(END_MARKER).ok_or(WireError::MissingEnd)?;
    Ok(&text[start..start + len])
}

/// Parse a complete framed message.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, WireError> {
    decode_body(unframe(text)?)
}

/// Parse a frame body already stripped of its markers.
pub fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, WireError> {
    serde_json::from_str(body).map_err(WireError::Decode)
}

#[cfg(test)]
mod tests {
    use rapd_model::{Address, JobCommand};
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn job_command_survives_framing() {
        let mut cmd = JobCommand::new("INDEX", json!({"image": "/raw/a_001.cbf"}), Address::new("10.1.1.1", 50001));
        cmd.directories.work = Some("single/a".into());
        cmd.extra.insert("site_tag".into(), json!("NECAT_E"));

        let text = frame(&cmd).unwrap();
        assert!(text.starts_with(START_MARKER));
        assert!(text.ends_with(END_MARKER));

        let back: JobCommand = decode(&text).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn arbitrary_json_survives_framing() {
        let value = json!(["ECHO", {}, [1, 2, 3], null, ["h", 1]]);
        let back: Value = decode(&frame(&value).unwrap()).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn unframe_requires_both_markers() {
        assert!(matches!(unframe("{}<rapd_end>"), Err(WireError::MissingStart)));
        assert!(matches!(unframe("<rapd_start>{}"), Err(WireError::MissingEnd)));
        assert_eq!(unframe("junk<rapd_start>{}<rapd_end>\n").unwrap(), "{}");
    }

    #[test]
    fn bad_json_is_a_decode_error() {
        let res: Result<Value, _> = decode("<rapd_start>{not json<rapd_end>");
        assert!(matches!(res, Err(WireError::Decode(_))));
    }
}
