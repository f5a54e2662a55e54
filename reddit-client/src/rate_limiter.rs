use reqwest::header::HeaderMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    pub burst_allowance: u32,
}

impl RateLimitConfig {
    pub fn reddit_oauth() -> Self {
        Self {
            max_requests: 100, // Reddit allows 100 requests per minute for OAuth2
            time_window: Duration::from_secs(60),
            burst_allowance: 10,
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = config.burst_allowance as f64;
        let refill_rate = config.max_requests as f64 / config.time_window.as_secs_f64();

        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Take `tokens_needed` tokens, or report how long until they are available.
    pub async fn acquire(&self, tokens_needed: f64) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= tokens_needed {
            state.tokens -= tokens_needed;
            Ok(())
        } else {
            let missing = tokens_needed - state.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_rate))
        }
    }

    pub async fn get_available_tokens(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    token_bucket: TokenBucket,
    config: RateLimitConfig,
    /// Set when the server reports an exhausted quota.
    blocked_until: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
            config,
            blocked_until: Mutex::new(None),
        }
    }

    pub async fn acquire_permit(&self) -> RateLimitPermit {
        let start_time = Instant::now();

        let blocked = self.blocked_until.lock().await.take();
        if let Some(until) = blocked {
            let now = Instant::now();
            if until > now {
                tracing::debug!("Server quota exhausted, waiting {:?}", until - now);
                sleep(until - now).await;
            }
        }

        loop {
            match self.token_bucket.acquire(1.0).await {
                Ok(()) => break,
                Err(wait_time) => {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    sleep(wait_time).await;
                }
            }
        }

        RateLimitPermit {
            queue_wait_time: start_time.elapsed(),
        }
    }

    /// Honor Reddit's `x-ratelimit-remaining` / `x-ratelimit-reset` headers: when
    /// the remaining quota drops below one request, hold the next permit until
    /// the window resets.
    pub async fn observe_headers(&self, headers: &HeaderMap) {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
        };

        if let (Some(remaining), Some(reset)) =
            (read("x-ratelimit-remaining"), read("x-ratelimit-reset"))
        {
            if remaining < 1.0 {
                // A reset further out than one window (or not finite) is capped at the window.
                let wait = Duration::try_from_secs_f64(reset.max(0.0))
                    .unwrap_or(self.config.time_window)
                    .min(self.config.time_window);
                tracing::warn!("Reddit quota exhausted, pausing requests for {:?}", wait);
                *self.blocked_until.lock().await = Some(Instant::now() + wait);
            }
        }
    }

    pub async fn get_rate_limit_status(&self) -> RateLimitStatus {
        let available_tokens = self.token_bucket.get_available_tokens().await;
        let blocked_for = self
            .blocked_until
            .lock()
            .await
            .map(|until| until.saturating_duration_since(Instant::now()));

        let estimated_wait_time = if available_tokens < 1.0 {
            Some(Duration::from_secs_f64(
                (1.0 - available_tokens) * self.config.time_window.as_secs_f64()
                    / self.config.max_requests as f64,
            ))
        } else {
            None
        };

        RateLimitStatus {
            available_tokens: available_tokens as u32,
            max_tokens: self.config.burst_allowance,
            requests_per_minute: self.config.max_requests,
            estimated_wait_time: match (estimated_wait_time, blocked_for) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

#[derive(Debug)]
pub struct RateLimitPermit {
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub available_tokens: u32,
    pub max_tokens: u32,
    pub requests_per_minute: u32,
    pub estimated_wait_time: Option<Duration>,
}
