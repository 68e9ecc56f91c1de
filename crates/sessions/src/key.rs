use {supportdesk_common::ChannelKind, uuid::Uuid};

/// Namespace for session ids. Changing it re-keys every stored session.
const SESSION_NAMESPACE: Uuid = Uuid::from_u128(0x5f0c_2a71_9d3e_4b8a_a6c1_3e7d_52f9_0b14);

/// Stable session id for a conversation thread on a channel.
///
/// UUIDv5 of `"{kind}:{thread_key}"`, so it survives process restarts.
pub fn session_id_for(kind: ChannelKind, external_thread_key: &str) -> String {
    let name = format!("{kind}:{external_thread_key}");
    Uuid::new_v5(&SESSION_NAMESPACE, name.as_bytes()).to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn same_thread_same_id() {
        let a = session_id_for(ChannelKind::Chat, "C123:1700000000.000100");
        let b = session_id_for(ChannelKind::Chat, "C123:1700000000.000100");
        assert_eq!(a, b);
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 5);
    }

    #[test]
    fn kind_and_key_both_matter() {
        let chat = session_id_for(ChannelKind::Chat, "42");
        let ticket = session_id_for(ChannelKind::Ticket, "42");
        let other = session_id_for(ChannelKind::Chat, "43");
        assert_ne!(chat, ticket);
        assert_ne!(chat, other);
    }

    #[test]
    fn id_matches_v5_of_prefixed_name() {
        let expected = Uuid::new_v5(&SESSION_NAMESPACE, b"ticket:issue-7").to_string();
        assert_eq!(session_id_for(ChannelKind::Ticket, "issue-7"), expected);
    }
}
