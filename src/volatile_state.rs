use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};
use tokio::time::Instant;

/// State which is lost across sessions
pub struct VolatileState {
    pub cooldowns: Cooldowns,
    /// Set once the stream watcher has been spawned.  Discord sends `Ready` again on reconnect.
    pub stream_watcher_started: bool,
}

/// Per-command rate limits
pub struct Cooldowns {
    /// `stream get`, per user
    pub stream_get: Cooldown,
    /// `stream user`, per user
    pub stream_user: Cooldown,
    /// `stream follow`, per guild
    pub stream_follow: Cooldown,
}

/// Sliding window allowing `rate` uses per `per` for each key
pub struct Cooldown {
    rate: usize,
    per: Duration,
    uses: HashMap<u64, VecDeque<Instant>>,
}

impl VolatileState {
    pub fn new() -> Self {
        Self {
            cooldowns: Cooldowns {
                stream_get: Cooldown::new(3, Duration::from_secs(5 * 60)),
                stream_user: Cooldown::new(3, Duration::from_secs(5 * 60)),
                stream_follow: Cooldown::new(15, Duration::from_secs(30 * 60)),
            },
            stream_watcher_started: false,
        }
    }
}

impl Cooldown {
    pub fn new(rate: usize, per: Duration) -> Self {
        Self {
            rate,
            per,
            uses: HashMap::new(),
        }
    }

    /// Record a use for `key`, or return how long until the next use is allowed.
    pub fn try_acquire(&mut self, key: u64) -> Result<(), Duration> {
        let now = Instant::now();
        let per = self.per;

        // Keys whose uses have all expired are forgotten.
        self.uses.retain(|_, uses| {
            while let Some(oldest) = uses.front() {
                if now.duration_since(*oldest) < per {
                    break;
                }
                uses.pop_front();
            }
            !uses.is_empty()
        });

        let uses = self.uses.entry(key).or_default();
        if uses.len() >= self.rate {
            if let Some(oldest) = uses.front() {
                return Err(per.saturating_sub(now.duration_since(*oldest)));
            }
        }

        uses.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooldown_admits_rate_per_window() {
        let mut cooldown = Cooldown::new(3, Duration::from_secs(300));

        for _ in 0..3 {
            assert!(cooldown.try_acquire(1).is_ok());
        }
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(cooldown.try_acquire(1), Err(Duration::from_secs(200)));

        // Other keys are unaffected
        assert!(cooldown.try_acquire(2).is_ok());

        tokio::time::advance(Duration::from_secs(200)).await;
        assert!(cooldown.try_acquire(1).is_ok());
        assert!(cooldown.try_acquire(1).is_ok());
        assert!(cooldown.try_acquire(1).is_ok());
        assert!(cooldown.try_acquire(1).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn uses_expire_one_at_a_time() {
        let mut cooldown = Cooldown::new(2, Duration::from_secs(60));

        assert!(cooldown.try_acquire(7).is_ok());
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cooldown.try_acquire(7).is_ok());
        assert!(cooldown.try_acquire(7).is_err());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cooldown.try_acquire(7).is_ok());
        assert_eq!(cooldown.try_acquire(7), Err(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_keys_are_forgotten() {
        let mut cooldown = Cooldown::new(3, Duration::from_secs(60));
        for key in 0..100 {
            assert!(cooldown.try_acquire(key).is_ok());
        }
        assert_eq!(cooldown.uses.len(), 100);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cooldown.try_acquire(500).is_ok());

        assert_eq!(cooldown.uses.len(), 1);
        assert!(cooldown.uses.contains_key(&500));
    }
}
