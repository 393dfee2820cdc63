//! LLM API interaction with a bounded time budget.
//!
//! Both external capabilities used by the digest (article extraction and
//! batched merging) are "send text, get text back" calls against an
//! OpenAI-compatible endpoint configured through `awful_aj`.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining async LLM interaction
//! - [`AskFnWrapper`]: Wraps the `awful_aj` library's `ask` function
//! - [`TimeoutAsk`]: Decorator that fails a call once its time budget elapses
//!
//! There is no retry decorator. The merge capability is called at most once
//! per pass, and a failed call goes straight to the caller's fallback.

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors of this trait can send text to an LLM and receive a response.
/// This abstraction allows for different LLM backends or decorators (like the
/// time budget) and for in-process fakes in tests.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send text to the LLM and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that bounds any [`AskAsync`] call by a wall-clock budget.
///
/// An elapsed budget is reported as an error, never as a hang, so callers
/// always reach their fallback path.
pub struct TimeoutAsk<T> {
    /// The underlying LLM client to wrap.
    inner: T,
    /// Maximum time a single call may take.
    budget: StdDuration,
}

impl<T> TimeoutAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, budget: StdDuration) -> Self {
        Self { inner, budget }
    }
}

impl<T> fmt::Debug for TimeoutAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutAsk")
            .field("budget", &self.budget)
            .finish()
    }
}

impl<T> AskAsync for TimeoutAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all, fields(budget_secs = self.budget.as_secs()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        match timeout(self.budget, self.inner.ask(text)).await {
            Ok(res) => {
                let dt = t0.elapsed();
                match &res {
                    Ok(_) => info!(elapsed_ms = dt.as_millis(), "ask() succeeded"),
                    Err(e) => warn!(elapsed_ms = dt.as_millis(), error = %e, "ask() failed"),
                }
                res
            }
            Err(_) => {
                warn!(budget = ?self.budget, "ask() exceeded its time budget");
                Err(format!("LLM call exceeded {:?} budget", self.budget).into())
            }
        }
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
///
/// # Lifetime Parameters
///
/// * `'a` - The lifetime of the references to config and template
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// Reference to the LLM configuration (API keys, endpoints, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Reference to the chat template defining the conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(chars = text.len()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        if let Err(e) = &res {
            warn!(elapsed_ms = dt.as_millis() as u128, error = %e, "API call failed");
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Slow {
        calls: Cell<usize>,
        delay: StdDuration,
    }

    impl AskAsync for Slow {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            tokio::time::sleep(self.delay).await;
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_timeout_passes_through_fast_calls() {
        let api = TimeoutAsk::new(
            Slow { calls: Cell::new(0), delay: StdDuration::from_millis(1) },
            StdDuration::from_secs(5),
        );
        assert_eq!(api.ask("hello").await.unwrap(), "HELLO");
        assert_eq!(api.inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_slow_calls_once() {
        let api = TimeoutAsk::new(
            Slow { calls: Cell::new(0), delay: StdDuration::from_secs(10) },
            StdDuration::from_millis(20),
        );
        let err = api.ask("hello").await.unwrap_err();
        assert!(err.to_string().contains("budget"));
        assert_eq!(api.inner.calls.get(), 1);
    }
}
