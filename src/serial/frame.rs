//! Frame unwrapping for the scanner wire format.
//!
//! Messages may arrive wrapped as `STX<payload>ETX` where the markers are the
//! literal 3-character strings, not control bytes. Anything else passes
//! through untouched.

const START_MARKER: &str = "STX";
const END_MARKER: &str = "ETX";

/// Strip the `STX`/`ETX` marker pair from `raw`, yielding the payload.
///
/// Unframed or too-short input is returned unchanged; this never fails.
pub fn unwrap_frame(raw: &str) -> &str {
    if raw.len() >= START_MARKER.len() + END_MARKER.len()
        && raw.starts_with(START_MARKER)
        && raw.ends_with(END_MARKER)
    {
        let payload = &raw[START_MARKER.len()..raw.len() - END_MARKER.len()];
        log::info!("Parsed STX/ETX frame: '{}' -> '{}'", raw, payload);
        payload
    } else {
        log::info!("Raw data (no STX/ETX): '{}'", raw);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_framed_payload() {
        assert_eq!(unwrap_frame("STXA01;A02ETX"), "A01;A02");
    }

    #[test]
    fn test_unwrap_empty_payload() {
        assert_eq!(unwrap_frame("STXETX"), "");
    }

    #[test]
    fn test_passthrough_without_markers() {
        assert_eq!(unwrap_frame("A01;A02"), "A01;A02");
        assert_eq!(unwrap_frame("RESET"), "RESET");
    }

    #[test]
    fn test_passthrough_too_short() {
        // Overlapping markers do not count as a frame.
        assert_eq!(unwrap_frame("STETX"), "STETX");
        assert_eq!(unwrap_frame("STX"), "STX");
        assert_eq!(unwrap_frame(""), "");
    }

    #[test]
    fn test_passthrough_one_sided_markers() {
        assert_eq!(unwrap_frame("STXA01"), "STXA01");
        assert_eq!(unwrap_frame("A01ETX"), "A01ETX");
    }

    #[test]
    fn test_unwrap_is_idempotent_once_unwrapped() {
        let once = unwrap_frame("STXB99ETX");
        assert_eq!(unwrap_frame(once), once);
    }
}
