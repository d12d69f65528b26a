//! Deterministic annotator used by pipeline tests.

use super::Annotator;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-process annotator with scripted behavior.
///
/// The default behavior uppercases its input, which keeps the output
/// non-empty, deterministic, and byte-for-byte distinguishable from the
/// input. Failure and delay behavior is keyed on input content so tests can
/// target individual chunks by what they contain.
#[derive(Default)]
pub struct FakeAnnotator {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_on: Option<String>,
    empty_on: Option<String>,
    delay: Option<Duration>,
    delay_on: Option<(String, Duration)>,
}

impl FakeAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail (with an error) on any input containing `pattern`.
    pub fn with_failure_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Return empty output for any input containing `pattern`.
    pub fn with_empty_on(mut self, pattern: &str) -> Self {
        self.empty_on = Some(pattern.to_string());
        self
    }

    /// Sleep this long on every call before responding.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sleep before responding, but only for inputs containing `pattern`.
    pub fn with_delay_on(mut self, pattern: &str, delay: Duration) -> Self {
        self.delay_on = Some((pattern.to_string(), delay));
        self
    }

    /// Total number of `annotate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `annotate` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the call is cancelled mid-await.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Annotator for FakeAnnotator {
    async fn annotate(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        let text = String::from_utf8_lossy(input).into_owned();

        if let Some((pattern, delay)) = &self.delay_on {
            if text.contains(pattern) {
                tokio::time::sleep(*delay).await;
            }
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(pattern) = &self.fail_on {
            if text.contains(pattern) {
                bail!("fake annotator rejected chunk");
            }
        }
        if let Some(pattern) = &self.empty_on {
            if text.contains(pattern) {
                return Ok(Vec::new());
            }
        }

        Ok(input.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uppercases_by_default() {
        let fake = FakeAnnotator::new();
        let out = fake.annotate(b"hola\n").await.unwrap();
        assert_eq!(out, b"HOLA\n");
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_and_empty_patterns() {
        let fake = FakeAnnotator::new().with_failure_on("bad").with_empty_on("void");
        assert!(fake.annotate(b"a bad line\n").await.is_err());
        assert!(fake.annotate(b"the void\n").await.unwrap().is_empty());
        assert_eq!(fake.annotate(b"fine\n").await.unwrap(), b"FINE\n");
        assert_eq!(fake.calls(), 3);
    }

    #[tokio::test]
    async fn test_gauge_tracks_concurrency() {
        use futures::stream::{FuturesUnordered, StreamExt};
        use std::sync::Arc;

        let fake = Arc::new(FakeAnnotator::new().with_delay(Duration::from_millis(20)));
        let mut futs = FuturesUnordered::new();
        for _ in 0..4 {
            let fake = fake.clone();
            futs.push(async move { fake.annotate(b"x\n").await });
        }
        while let Some(result) = futs.next().await {
            result.unwrap();
        }
        assert_eq!(fake.max_in_flight(), 4);
    }
}
