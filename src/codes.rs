//! Identity and code generation: room codes, capability ids, avatars and the
//! nickname filter. None of these are cryptographically strong.

use rand::{Rng, seq::IndexedRandom};
use time::OffsetDateTime;

/// Symbols allowed in room codes. `I`, `O`, `0` and `1` are left out.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
/// Number of symbols in a room code.
pub const ROOM_CODE_LEN: usize = 6;
/// Longest nickname kept after sanitizing, in characters.
pub const NICKNAME_MAX_CHARS: usize = 20;

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Avatars handed out to joining players.
pub const AVATAR_EMOJIS: [&str; 22] = [
    "😀", "😎", "🤩", "😊", "🥳", "🤓", "😇", "🦄", "🦊", "🐻", "🐼", "🐨", "🦁", "🐯", "🦋", "🌟",
    "⭐", "✨", "🎨", "🎭", "🎪", "🎯",
];

/// Draw a fresh room code. Uniqueness is not checked here.
pub fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Capability token identifying the device that created a session.
pub fn generate_host_id() -> String {
    prefixed_id("host")
}

/// Capability token identifying a joined player's device.
pub fn generate_player_id() -> String {
    prefixed_id("player")
}

fn prefixed_id(prefix: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_ALPHABET[rng.random_range(0..ID_SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}_{millis}_{suffix}")
}

/// Uniform pick from [`AVATAR_EMOJIS`].
pub fn random_emoji() -> &'static str {
    AVATAR_EMOJIS.choose(&mut rand::rng()).copied().unwrap_or("😀")
}

/// Whether `code` has the shape of a room code, ignoring case.
pub fn is_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Case-insensitive masking of a configured word list.
#[derive(Debug, Clone)]
pub struct WordFilter {
    words: Vec<Vec<char>>,
    mask: String,
}

impl WordFilter {
    /// Filter replacing each occurrence of `words` with `mask`.
    pub fn new<I, S>(words: I, mask: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|word| fold(word.as_ref()))
            .filter(|word| !word.is_empty())
            .collect();
        Self {
            words,
            mask: mask.into(),
        }
    }

    /// Replace every banned word in `text`, scanning left to right.
    pub fn apply(&self, text: &str) -> String {
        let mut output = text.to_string();
        for word in &self.words {
            output = self.mask_word(&output, word);
        }
        output
    }

    fn mask_word(&self, text: &str, word: &[char]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let folded: Vec<char> = chars.iter().map(|c| fold_char(*c)).collect();
        let mut output = String::with_capacity(text.len());
        let mut index = 0;

        while index < chars.len() {
            if folded[index..].starts_with(word) {
                output.push_str(&self.mask);
                index += word.len();
            } else {
                output.push(chars[index]);
                index += 1;
            }
        }
        output
    }
}

impl Default for WordFilter {
    fn default() -> Self {
        Self::new(["placeholder"], "***")
    }
}

fn fold(word: &str) -> Vec<char> {
    word.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Trim, mask banned words, then cap at [`NICKNAME_MAX_CHARS`] characters.
///
/// Masking sees the whole input; the cap bounds the masked result.
pub fn sanitize_nickname(raw: &str, filter: &WordFilter) -> String {
    let masked = filter.apply(raw.trim());
    masked.chars().take(NICKNAME_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn room_codes_use_the_unambiguous_alphabet() {
        for _ in 0..200 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LEN);
            assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
            assert!(!code.contains(['I', 'O', '0', '1']));
        }
    }

    #[test]
    fn room_codes_are_spread_over_the_alphabet() {
        let seen: HashSet<char> = (0..500).flat_map(|_| generate_room_code().chars().collect::<Vec<_>>()).collect();
        assert!(seen.len() > 25, "only {} distinct symbols drawn", seen.len());
    }

    #[test]
    fn ids_carry_prefix_timestamp_and_suffix() {
        let id = generate_player_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "player");
        assert!(parts[1].parse::<i128>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(generate_host_id().starts_with("host_"));
    }

    #[test]
    fn emoji_comes_from_the_palette() {
        for _ in 0..50 {
            assert!(AVATAR_EMOJIS.contains(&random_emoji()));
        }
    }

    #[test]
    fn filter_is_case_insensitive() {
        let filter = WordFilter::default();
        assert_eq!(filter.apply("My PlaceHolder name"), "My *** name");
        assert_eq!(filter.apply("placeholderplaceholder"), "******");
        assert_eq!(filter.apply("Sam"), "Sam");
    }

    #[test]
    fn filter_uses_configured_words_and_mask() {
        let filter = WordFilter::new(["bad", ""], "#");
        assert_eq!(filter.apply("BADminton"), "#minton");
    }

    #[test]
    fn nickname_is_trimmed_capped_and_filtered() {
        let filter = WordFilter::default();
        assert_eq!(sanitize_nickname("   Sam  ", &filter), "Sam");
        let long = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(sanitize_nickname(long, &filter).chars().count(), NICKNAME_MAX_CHARS);
        assert_eq!(sanitize_nickname(" placeholder ", &filter), "***");
    }

    #[test]
    fn nickname_cap_applies_after_masking() {
        let filter = WordFilter::new(["rude"], "<removed-word>");
        let masked = sanitize_nickname("rude rude rude", &filter);
        assert_eq!(masked.chars().count(), NICKNAME_MAX_CHARS);
        assert!(!masked.contains("rude"));

        // The banned word straddles the cap.
        let straddling = sanitize_nickname("abcdefghijklmnopqrrude", &filter);
        assert_eq!(straddling, "abcdefghijklmnopqr<r");
    }

    #[test]
    fn recognizes_room_code_shape() {
        assert!(is_room_code("ab3x7k"));
        assert!(!is_room_code("AB3X7"));
        assert!(!is_room_code("AB3X7-"));
    }
}
