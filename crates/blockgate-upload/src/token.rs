use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

static LAST_TIME_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Hex token derived from the current time in nanoseconds.
///
/// Strictly increasing within the process even when the clock stalls or
/// steps back, so two callers never receive the same token.
pub fn time_token() -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let prev = LAST_TIME_TOKEN
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    hex::encode(now.max(prev + 1).to_be_bytes())
}

/// Opaque correlation ID for a request, shown to clients on internal errors.
pub fn request_id() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn time_tokens_increase() {
        let tokens: Vec<_> = (0..1000).map(|_| time_token()).collect();
        assert!(tokens.windows(2).all(|w| w[0] < w[1]));
        assert!(tokens.iter().all(|t| t.len() == 16));
    }

    #[test]
    fn request_ids_are_distinct() {
        let ids: HashSet<_> = (0..100).map(|_| request_id()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.len() == 16));
    }
}
