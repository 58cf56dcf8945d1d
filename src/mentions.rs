// Mention resolution — "@username" tokens in accepted plaintext.
//
// Scans the original (non-normalized) content: candidates are matched
// case-insensitively against the room's member set, repeated mentions of
// the same user dedup to one, and the author can't mention themselves.
// Tokens that resolve to nobody are silently ignored — a stray "@everyone"
// or a typo is not an error.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::db::models::RoomMember;

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // The leading group rejects "a@b" so email addresses don't read as
    // mentions; usernames are letters, digits, and ._-
    PATTERN.get_or_init(|| Regex::new(r"(^|[^A-Za-z0-9._-])@([A-Za-z0-9._-]+)").unwrap())
}

/// Resolve the distinct mentioned user ids in `plaintext`, in order of
/// first appearance.
pub fn extract(plaintext: &str, author_id: i64, members: &[RoomMember]) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for captures in mention_pattern().captures_iter(plaintext) {
        let Some(candidate) = captures.get(2) else {
            continue;
        };
        let candidate = candidate.as_str();
        let Some(member) = members
            .iter()
            .find(|m| m.username.eq_ignore_ascii_case(candidate))
        else {
            continue;
        };
        if member.user_id == author_id {
            continue;
        }
        if seen.insert(member.user_id) {
            resolved.push(member.user_id);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<RoomMember> {
        vec![
            RoomMember {
                user_id: 1,
                username: "alice".to_string(),
            },
            RoomMember {
                user_id: 2,
                username: "Bob".to_string(),
            },
            RoomMember {
                user_id: 3,
                username: "carol.w".to_string(),
            },
        ]
    }

    #[test]
    fn test_resolves_member() {
        assert_eq!(extract("hey @bob, lab at 4?", 1, &members()), vec![2]);
    }

    #[test]
    fn test_case_insensitive_both_ways() {
        assert_eq!(extract("@BOB @Alice", 3, &members()), vec![2, 1]);
    }

    #[test]
    fn test_dedups_repeated_mentions() {
        assert_eq!(extract("@bob @bob @bob", 1, &members()), vec![2]);
    }

    #[test]
    fn test_excludes_author() {
        assert_eq!(extract("as @alice said, ask @bob", 1, &members()), vec![2]);
        assert!(extract("@alice", 1, &members()).is_empty());
    }

    #[test]
    fn test_unresolvable_tokens_ignored() {
        assert!(extract("@everyone @nobody-here", 1, &members()).is_empty());
    }

    #[test]
    fn test_email_is_not_a_mention() {
        assert!(extract("reach me at bob@campus.edu", 1, &members()).is_empty());
    }

    #[test]
    fn test_punctuation_boundaries() {
        assert_eq!(extract("(@bob) thanks!", 1, &members()), vec![2]);
        assert_eq!(extract("ping @carol.w", 1, &members()), vec![3]);
    }

    #[test]
    fn test_start_of_text() {
        assert_eq!(extract("@bob morning", 1, &members()), vec![2]);
    }

    #[test]
    fn test_no_mentions() {
        assert!(extract("nothing to see here", 1, &members()).is_empty());
    }

    #[test]
    fn test_order_of_first_appearance() {
        assert_eq!(extract("@carol.w then @bob then @carol.w", 1, &members()), vec![3, 2]);
    }
}
