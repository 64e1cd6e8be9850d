use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;

/// Tracks daily and hourly search volume in-process. The daily counter
/// rolls over at UTC midnight; there is no per-second throttling, only a
/// record of how many queries have been issued today and this hour.
///
/// Grounded on the "no per-second limiting - just record the query" daily
/// quota tracker, with an added hourly burst cap from the same config.
pub struct RateLimiter {
    daily_quota: u64,
    hourly_cap: u64,
    state: Mutex<State>,
}

struct State {
    day: NaiveDate,
    daily_count: u64,
    hour: u32,
    hourly_count: u64,
}

impl RateLimiter {
    pub fn new(daily_quota: u64, hourly_cap: u64) -> Self {
        let now = Utc::now();
        Self {
            daily_quota,
            hourly_cap,
            state: Mutex::new(State {
                day: now.date_naive(),
                daily_count: 0,
                hour: now_hour(),
                hourly_count: 0,
            }),
        }
    }

    /// True if issuing one more query would stay within both the daily
    /// quota and the hourly burst cap.
    pub async fn can_proceed(&self) -> bool {
        let mut state = self.state.lock().await;
        self.roll_if_needed(&mut state);
        state.daily_count < self.daily_quota && state.hourly_count < self.hourly_cap
    }

    /// Records one query against both counters. Call only after deciding to
    /// actually issue the request.
    pub async fn record(&self) {
        let mut state = self.state.lock().await;
        self.roll_if_needed(&mut state);
        state.daily_count += 1;
        state.hourly_count += 1;
    }

    /// Blocks until a query may be issued under both the daily quota and the
    /// hourly burst cap, sleeping until the relevant boundary (next UTC
    /// midnight, or next UTC hour) when either is exhausted, then records
    /// the consumed unit against both counters. There is intentionally no
    /// per-second spacing here.
    pub async fn wait_if_needed(&self) {
        loop {
            let sleep_for = {
                let mut state = self.state.lock().await;
                self.roll_if_needed(&mut state);
                if state.daily_count >= self.daily_quota {
                    Some(seconds_until_next_utc_midnight())
                } else if state.hourly_count >= self.hourly_cap {
                    Some(seconds_until_next_utc_hour())
                } else {
                    state.daily_count += 1;
                    state.hourly_count += 1;
                    None
                }
            };
            match sleep_for {
                Some(d) => tokio::time::sleep(d).await,
                None => return,
            }
        }
    }

    pub async fn daily_remaining(&self) -> u64 {
        let mut state = self.state.lock().await;
        self.roll_if_needed(&mut state);
        self.daily_quota.saturating_sub(state.daily_count)
    }

    fn roll_if_needed(&self, state: &mut State) {
        let now = Utc::now();
        let today = now.date_naive();
        if today != state.day {
            state.day = today;
            state.daily_count = 0;
        }
        let hour = now_hour();
        if hour != state.hour {
            state.hour = hour;
            state.hourly_count = 0;
        }
    }
}

fn now_hour() -> u32 {
    use chrono::Timelike;
    Utc::now().hour()
}

fn seconds_until_next_utc_midnight() -> std::time::Duration {
    let now = Utc::now();
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let secs = (midnight - now).num_seconds().max(1) as u64;
    std::time::Duration::from_secs(secs)
}

fn seconds_until_next_utc_hour() -> std::time::Duration {
    use chrono::Timelike;
    let now = Utc::now();
    let secs = (3600 - (now.minute() as i64 * 60 + now.second() as i64)).max(1) as u64;
    std::time::Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_daily_quota() {
        let limiter = RateLimiter::new(2, 100);
        assert!(limiter.can_proceed().await);
        limiter.record().await;
        assert!(limiter.can_proceed().await);
        limiter.record().await;
        assert!(!limiter.can_proceed().await);
    }

    #[tokio::test]
    async fn hourly_cap_blocks_independently_of_daily_quota() {
        let limiter = RateLimiter::new(1000, 1);
        assert!(limiter.can_proceed().await);
        limiter.record().await;
        assert!(!limiter.can_proceed().await);
    }

    #[tokio::test]
    async fn wait_if_needed_also_consumes_the_hourly_budget() {
        let limiter = RateLimiter::new(1000, 1);
        limiter.wait_if_needed().await;
        assert!(!limiter.can_proceed().await, "hourly cap should be exhausted after one wait_if_needed call");
    }
}
