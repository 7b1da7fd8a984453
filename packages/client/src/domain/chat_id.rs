//! Canonical identifiers for one-to-one conversations.
//!
//! A direct conversation between two users is keyed by a string derived from
//! both stable participant identifiers (mobile numbers), independent of who
//! started the conversation.

/// Prefix of every canonical direct-chat identifier
pub const CHAT_ID_PREFIX: &str = "chat_";

/// Separator between the two participant identifiers
pub const CHAT_ID_SEPARATOR: &str = "_with_";

/// Derive the canonical conversation id for two participants.
///
/// The two identifiers are ordered lexicographically, so
/// `canonical_id(a, b) == canonical_id(b, a)`.
///
/// # Examples
///
/// ```
/// use kizuna_client::domain::canonical_id;
///
/// assert_eq!(canonical_id("222", "111"), "chat_111_with_222");
/// ```
pub fn canonical_id(id_a: &str, id_b: &str) -> String {
    let (low, high) = if id_a <= id_b {
        (id_a, id_b)
    } else {
        (id_b, id_a)
    };
    format!("{CHAT_ID_PREFIX}{low}{CHAT_ID_SEPARATOR}{high}")
}

/// Recover the other participant's identifier from a canonical chat id.
///
/// The operand that is not `self_id` is the other side. Returns `None` when
/// `chat_id` is not a canonical direct-chat id or `self_id` is not one of its
/// operands (e.g. a server-issued group id).
pub fn counterpart(chat_id: &str, self_id: &str) -> Option<String> {
    let pair = chat_id.strip_prefix(CHAT_ID_PREFIX)?;

    // Anchor on the known operand so identifiers containing the separator
    // still split at the right place.
    if let Some(other) = pair
        .strip_prefix(self_id)
        .and_then(|rest| rest.strip_prefix(CHAT_ID_SEPARATOR))
    {
        return Some(other.to_string());
    }

    pair.strip_suffix(self_id)
        .and_then(|rest| rest.strip_suffix(CHAT_ID_SEPARATOR))
        .map(str::to_string)
}

/// Whether `chat_id` has the shape of a canonical direct-chat id.
pub fn is_direct_chat_id(chat_id: &str) -> bool {
    chat_id
        .strip_prefix(CHAT_ID_PREFIX)
        .is_some_and(|pair| pair.contains(CHAT_ID_SEPARATOR))
}
