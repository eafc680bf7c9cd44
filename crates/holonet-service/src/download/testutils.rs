use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Fetch, Headers};
use crate::caching::FetchError;

/// A [`Fetch`] implementation serving canned responses by URL.
///
/// Unknown URLs respond with a 404 status error. It keeps track of the number of calls and of
/// the highest number of calls in flight at the same time.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Result<Value, u16>>>,
    requests: Mutex<Vec<(String, Headers)>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits for `delay` before responding.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn respond(&self, url: &str, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_owned(), Ok(value));
    }

    pub fn fail(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_owned(), Err(status));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// All requested URLs, with query parameters appended, in call order.
    pub fn requested_urls(&self) -> Vec<String> {
        let requests = self.requests.lock().unwrap();
        requests.iter().map(|(url, _)| url.clone()).collect()
    }

    /// All request headers, in call order.
    pub fn requested_headers(&self) -> Vec<Headers> {
        let requests = self.requests.lock().unwrap();
        requests.iter().map(|(_, headers)| headers.clone()).collect()
    }
}

#[async_trait]
impl Fetch for MockFetcher {
    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        headers: &Headers,
    ) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let mut requested = url.to_owned();
        for (i, (key, value)) in params.iter().enumerate() {
            requested.push(if i == 0 { '?' } else { '&' });
            requested.push_str(&format!("{key}={value}"));
        }
        self.requests
            .lock()
            .unwrap()
            .push((requested, headers.clone()));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let response = self.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Ok(value)) => Ok(value),
            Some(Err(status)) => Err(FetchError::HttpStatus {
                status,
                url: url.to_owned(),
            }),
            None => Err(FetchError::HttpStatus {
                status: 404,
                url: url.to_owned(),
            }),
        }
    }
}
