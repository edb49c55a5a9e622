//! IRC case-mapping functions.
//!
//! IRC uses a special case-insensitive comparison where some characters
//! are considered equivalent (e.g., `[` and `{`). This implements the
//! `rfc1459` case mapping, which servers use for nicknames by default.

#[inline]
fn fold(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => c.to_ascii_lowercase(),
        _ => c,
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(fold).collect()
}

/// Compare two strings using IRC case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold(x) == fold(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irc_eq_brackets() {
        assert!(irc_eq("Nick[away]", "nick{AWAY}"));
        assert!(irc_eq("a\\b~", "A|B^"));
        assert!(!irc_eq("nick", "nick_"));
    }

    #[test]
    fn test_irc_to_lower() {
        assert_eq!(irc_to_lower("NickServ"), "nickserv");
        assert_eq!(irc_to_lower("[Bot]"), "{bot}");
    }
}
