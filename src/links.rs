//! Join links, QR image URLs and the small time helpers the lobby screens use.

use std::time::Duration;

use time::OffsetDateTime;

use crate::codes::is_room_code;

const JOIN_PREFIX: &str = "/join/";

/// Link a player opens to join `room_code`.
pub fn join_url(public_origin: &str, room_code: &str) -> String {
    format!(
        "{}{JOIN_PREFIX}{}",
        public_origin.trim_end_matches('/'),
        room_code
    )
}

/// Image URL of a QR code encoding `join_url`.
pub fn qr_url(qr_endpoint: &str, size: u32, join_url: &str) -> String {
    format!(
        "{qr_endpoint}?size={size}x{size}&data={}",
        urlencoding::encode(join_url)
    )
}

/// Room code carried by a `/join/<CODE>` path, upper-cased.
pub fn parse_join_path(path: &str) -> Option<String> {
    let code = path.strip_prefix(JOIN_PREFIX)?.trim_end_matches('/');
    is_room_code(code).then(|| code.to_ascii_uppercase())
}

/// Countdown label, `m:ss`.
pub fn format_time(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Whether `expires_at` lies before `now`.
pub fn is_expired(expires_at: OffsetDateTime, now: OffsetDateTime) -> bool {
    expires_at < now
}

/// Whether a player last seen at `last_seen` is still within `window` of `now`.
pub fn can_reconnect(last_seen: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    let elapsed = now - last_seen;
    elapsed < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn builds_join_and_qr_links() {
        let join = join_url("https://party.example/", "AB3X7K");
        assert_eq!(join, "https://party.example/join/AB3X7K");
        assert_eq!(
            qr_url("https://api.qrserver.com/v1/create-qr-code/", 300, &join),
            "https://api.qrserver.com/v1/create-qr-code/?size=300x300&data=https%3A%2F%2Fparty.example%2Fjoin%2FAB3X7K"
        );
    }

    #[test]
    fn join_path_is_case_insensitive() {
        assert_eq!(parse_join_path("/join/ab3x7k"), Some("AB3X7K".into()));
        assert_eq!(parse_join_path("/join/AB3X7K/"), Some("AB3X7K".into()));
        assert_eq!(parse_join_path("/join/AB3X"), None);
        assert_eq!(parse_join_path("/lobby"), None);
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(59), "0:59");
        assert_eq!(format_time(60), "1:00");
        assert_eq!(format_time(125), "2:05");
    }

    #[test]
    fn freshness_window() {
        let now = datetime!(2024-05-01 10:01:00 UTC);
        let window = Duration::from_secs(60);
        assert!(can_reconnect(datetime!(2024-05-01 10:00:30 UTC), now, window));
        assert!(!can_reconnect(datetime!(2024-05-01 10:00:00 UTC), now, window));
        assert!(is_expired(datetime!(2024-05-01 10:00:59 UTC), now));
        assert!(!is_expired(datetime!(2024-05-01 10:01:00 UTC), now));
    }
}
