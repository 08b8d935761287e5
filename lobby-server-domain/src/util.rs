use chrono::{DateTime, Utc};

/// Returns an opaque token that is unique and hard to guess.
///
/// Used for login keys, session ids and user ids alike.
pub fn generate_unique_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn to_unix_millis(date: &DateTime<Utc>) -> i64 {
    date.timestamp_millis()
}

pub fn from_unix_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Current time truncated to the precision it is persisted with.
pub fn now_millis_precision() -> DateTime<Utc> {
    from_unix_millis(to_unix_millis(&Utc::now()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_unique_token()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens.iter().all(|t| t.len() == 32));
    }

    #[test]
    fn test_millis_conversion() {
        let now = now_millis_precision();
        assert_eq!(from_unix_millis(to_unix_millis(&now)), now);
    }
}
