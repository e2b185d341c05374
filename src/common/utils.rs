//! Utility functions for replikv

/// Get current Unix timestamp (milliseconds)
pub fn timestamp_now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_increases() {
        let a = timestamp_now_millis();
        let b = timestamp_now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
