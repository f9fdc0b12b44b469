//! Scriptable fetcher for driving failure branches in tests.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use crate::fetcher::{Fetch, FetchError, FetchRequest, FetchedResponse};

pub struct ScriptedFetcher {
    default_body: Option<String>,
    failing_urls: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    /// Every fetch succeeds with the given body.
    pub fn ok_everywhere(body: &str) -> Self {
        Self {
            default_body: Some(body.to_string()),
            failing_urls: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch fails with a network error.
    pub fn failing_everywhere() -> Self {
        Self {
            default_body: None,
            failing_urls: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail fetches for one exact URL, succeed elsewhere.
    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetch for ScriptedFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedResponse, FetchError>> + Send + 'a>> {
        Box::pin(async move {
            let url = request.url.to_string();
            self.calls.lock().unwrap().push(url.clone());

            if self.failing_urls.contains(&url) {
                return Err(FetchError::Network("scripted failure".into()));
            }
            match &self.default_body {
                Some(body) => Ok(FetchedResponse {
                    status: 200,
                    headers: vec![("content-type".into(), "text/plain".into())],
                    body: body.clone().into_bytes(),
                }),
                None => Err(FetchError::Network("scripted offline".into())),
            }
        })
    }
}
