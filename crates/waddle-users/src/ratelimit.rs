use dashmap::DashMap;
use waddle_core::types::CommunityId;

/// Fixed-window rate limiter keyed by `(community, user, module)` — the
/// first policy kind evaluated. A `DashMap` gives lock-free,
/// sharded access across concurrent sessions without a single mutex
/// serializing every community's checks.
pub struct RateLimiter {
    windows: DashMap<(i64, String, String), WindowState>,
}

struct WindowState {
    window_start_secs: u64,
    count: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Record one attempt and report whether it is within `limit` for the
    /// current `window_secs`-wide window. `now_secs` is the caller-supplied
    /// wall clock (unix seconds) so tests can drive it deterministically.
    pub fn check_and_record(
        &self,
        community_id: CommunityId,
        user_id: &str,
        module: &str,
        limit: u32,
        window_secs: u64,
        now_secs: u64,
    ) -> bool {
        let key = (community_id.0, user_id.to_string(), module.to_string());
        let window_start = (now_secs / window_secs.max(1)) * window_secs.max(1);

        let mut entry = self.windows.entry(key).or_insert_with(|| WindowState {
            window_start_secs: window_start,
            count: 0,
        });

        if entry.window_start_secs != window_start {
            entry.window_start_secs = window_start;
            entry.count = 0;
        }

        if entry.count >= limit {
            return false;
        }

        entry.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let rl = RateLimiter::new();
        for _ in 0..3 {
            assert!(rl.check_and_record(CommunityId(1), "u1", "help_mod", 3, 60, 1_000));
        }
        assert!(!rl.check_and_record(CommunityId(1), "u1", "help_mod", 3, 60, 1_000));
    }

    #[test]
    fn new_window_resets_count() {
        let rl = RateLimiter::new();
        for _ in 0..3 {
            assert!(rl.check_and_record(CommunityId(1), "u1", "help_mod", 3, 60, 1_000));
        }
        assert!(!rl.check_and_record(CommunityId(1), "u1", "help_mod", 3, 60, 1_059));
        assert!(rl.check_and_record(CommunityId(1), "u1", "help_mod", 3, 60, 1_061));
    }

    #[test]
    fn modules_and_users_are_independent() {
        let rl = RateLimiter::new();
        assert!(rl.check_and_record(CommunityId(1), "u1", "help_mod", 1, 60, 1_000));
        assert!(!rl.check_and_record(CommunityId(1), "u1", "help_mod", 1, 60, 1_000));
        assert!(rl.check_and_record(CommunityId(1), "u2", "help_mod", 1, 60, 1_000));
        assert!(rl.check_and_record(CommunityId(1), "u1", "other_mod", 1, 60, 1_000));
    }
}
