//! Pipeline stages of a scrape run.
//!
//! - `batch`: clear the event set, fan out over all sources, aggregate
//! - `source`: fetch, parse, drift check, ingest, log and alert for one source
//! - `retry`: classified retry with backoff
//! - `drift`: structural drift detection against run history
//! - `ingest`: deduplicating insert

pub mod batch;
pub mod drift;
pub mod ingest;
pub mod retry;
pub mod source;

pub use batch::run_batch;
pub use drift::{DriftDetector, DriftReason, DriftVerdict};
pub use retry::{RetryPolicy, Retryable};
pub use source::SourcePipeline;

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{AppError, Result};
    use crate::utils::http::{Fetcher, with_timeout};

    pub const FEED_TWO_EVENTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>お知らせ</title>
    <item>
      <title>秋まつり</title>
      <link>/event/1.html</link>
      <pubDate>Sat, 01 Nov 2025 10:00:00 +0900</pubDate>
    </item>
    <item>
      <title>星空観察会</title>
      <link>/event/2.html</link>
      <pubDate>Sat, 15 Nov 2025 19:00:00 +0900</pubDate>
    </item>
  </channel>
</rss>"#;

    pub const HTML_ONE_EVENT: &str = r#"<html><body>
  <article>
    <h2>村民文化祭のお知らせ</h2>
    <p>令和7年11月3日（月・祝）</p>
  </article>
</body></html>"#;

    #[derive(Debug, Clone)]
    enum Reply {
        Body(String),
        Status(u16),
        /// Never answers; cut off like a real request after 10s
        Hang,
    }

    /// Fetcher answering from a per-URL script. The last reply repeats.
    #[derive(Clone, Default)]
    pub struct ScriptedFetcher {
        replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
        calls: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        fn push(self, url: &str, reply: Reply) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        pub fn ok(self, url: &str, body: &str) -> Self {
            self.push(url, Reply::Body(body.to_string()))
        }

        pub fn status(self, url: &str, status: u16) -> Self {
            self.push(url, Reply::Status(status))
        }

        pub fn hang(self, url: &str) -> Self {
            self.push(url, Reply::Hang)
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        fn next_reply(&self, url: &str) -> Option<Reply> {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(url)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

            match self.next_reply(url) {
                Some(Reply::Body(body)) => Ok(body),
                Some(Reply::Status(status)) => Err(AppError::HttpStatus {
                    url: url.to_string(),
                    status,
                }),
                Some(Reply::Hang) => {
                    with_timeout(url, Duration::from_secs(10), std::future::pending()).await
                }
                None => Err(AppError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}
