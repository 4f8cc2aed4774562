//! Bounded retry of boolean conditions.
//!
//! [`wait_for`] evaluates a [`Condition`] until it holds or the timeout
//! elapses. It knows nothing about what is being checked.


use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::config::PollConfig;
use crate::Error;
use crate::Result;

/// Wait budget of one [`wait_for`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self { timeout, interval }
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self::new(config.timeout(), config.interval())
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

/// A named predicate evaluated repeatedly by [`wait_for`]
///
/// `check` returns `Ok(false)` for "not yet", including when the peer it
/// looks at is temporarily unreachable. An `Err` aborts the wait.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Condition: Send {
    /// Identifies the condition in logs and timeout errors
    fn name(&self) -> String;

    async fn check(&mut self) -> Result<bool>;
}

/// Evaluates `condition` every `interval` until it returns true.
///
/// Fails with [`Error::ConvergenceTimeout`] once `timeout` has elapsed
/// without success; the last evaluation happens at the deadline at the
/// latest. A single evaluation is cut off once it would end later than
/// `timeout + interval` after the start. Errors returned by the condition
/// are passed through unchanged.
pub async fn wait_for<C>(
    condition: &mut C,
    settings: PollSettings,
) -> Result<()>
where
    C: Condition + ?Sized,
{
    let start = Instant::now();
    let mut attempts: u64 = 0;

    loop {
        attempts += 1;
        let budget = settings.timeout.saturating_sub(start.elapsed()) + settings.interval;
        let evaluation = timeout(budget, condition.check()).await;
        let satisfied = match evaluation {
            Ok(result) => result?,
            Err(_) => {
                let name = condition.name();
                warn!("{} evaluation still pending after {:?}", name, start.elapsed());
                return Err(Error::ConvergenceTimeout {
                    condition: name,
                    timeout: settings.timeout,
                });
            }
        };
        if satisfied {
            debug!("{} satisfied after {} attempt(s)", condition.name(), attempts);
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= settings.timeout {
            let name = condition.name();
            warn!("{} still not satisfied after {:?} ({} attempts)", name, elapsed, attempts);
            return Err(Error::ConvergenceTimeout {
                condition: name,
                timeout: settings.timeout,
            });
        }

        debug!("{} not satisfied yet, attempt {}", condition.name(), attempts);
        sleep(settings.interval.min(settings.timeout - elapsed)).await;
    }
}

/// Condition backed by an async closure
pub struct FnCondition<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> Condition for FnCondition<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn check(&mut self) -> Result<bool> {
        (self.f)().await
    }
}

/// Wraps an async closure into a [`Condition`] for one-off checks.
///
/// ```ignore
/// let mut ready = condition_fn("log mentions leader", || async { Ok(true) });
/// wait_for(&mut ready, PollSettings::default()).await?;
/// ```
pub fn condition_fn<F, Fut>(
    name: impl Into<String>,
    f: F,
) -> FnCondition<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    FnCondition { name: name.into(), f }
}
