use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use teloxide::types::UserId;
use tokio::time::Instant;

/// Past this many remembered users, forget the ones whose cooldown ran out.
const CLEANUP_THRESHOLD: usize = 10_000;

/// Lets each user run a command once per cooldown period.
pub struct CommandCooldown {
    cooldown: Duration,
    last_used: Mutex<HashMap<UserId, Instant>>,
}

impl CommandCooldown {
    pub fn new(cooldown: Duration) -> CommandCooldown {
        CommandCooldown {
            cooldown,
            last_used: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a use by this user. If they're still cooling down, nothing is marked
    /// and the time left is returned instead.
    pub fn try_use(&self, user: UserId) -> Result<(), Duration> {
        let now = Instant::now();
        let mut last_used = self
            .last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if last_used.len() > CLEANUP_THRESHOLD {
            last_used.retain(|_, used| now.duration_since(*used) < self.cooldown);
        }

        if let Some(used) = last_used.get(&user) {
            let elapsed = now.duration_since(*used);
            if elapsed < self.cooldown {
                return Err(self.cooldown - elapsed);
            }
        }

        last_used.insert(user, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cools_down_per_user() {
        let cooldown = CommandCooldown::new(Duration::from_secs(5));

        assert_eq!(cooldown.try_use(UserId(1)), Ok(()));
        assert_eq!(cooldown.try_use(UserId(2)), Ok(()));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cooldown.try_use(UserId(1)), Err(Duration::from_secs(3)));

        // Getting turned away doesn't restart the wait.
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(cooldown.try_use(UserId(1)), Ok(()));
        assert_eq!(cooldown.try_use(UserId(1)), Err(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_cooldown_never_blocks() {
        let cooldown = CommandCooldown::new(Duration::ZERO);
        assert_eq!(cooldown.try_use(UserId(1)), Ok(()));
        assert_eq!(cooldown.try_use(UserId(1)), Ok(()));
    }
}
