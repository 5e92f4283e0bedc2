#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use news_pipeline::collector::derive_identity;
use news_pipeline::fetch::FeedTransport;
use news_pipeline::types::{Item, ItemState, PipelineError, Result, Source};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Transport stub serving canned responses per URL, in order. An
/// exhausted or unknown URL fails the fetch, which is itself useful for
/// error-path tests.
#[derive(Default)]
pub struct StubTransport {
    responses: Mutex<HashMap<String, VecDeque<std::result::Result<String, String>>>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_ok(&self, url: &str, body: impl Into<String>) {
        let mut responses = self.responses.lock().await;
        responses
            .entry(url.to_string())
            .or_default()
            .push_back(Ok(body.into()));
    }

    pub async fn push_err(&self, url: &str, message: impl Into<String>) {
        let mut responses = self.responses.lock().await;
        responses
            .entry(url.to_string())
            .or_default()
            .push_back(Err(message.into()));
    }
}

#[async_trait]
impl FeedTransport for StubTransport {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut responses = self.responses.lock().await;
        match responses.get_mut(url).and_then(|queue| queue.pop_front()) {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(PipelineError::Transport(message)),
            None => Err(PipelineError::Transport(format!("no stub response for {url}"))),
        }
    }
}

/// Builds a minimal RSS 2.0 document from (title, link, description)
/// triples, using the link as the guid.
pub fn rss_feed(entries: &[(&str, &str, &str)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Test Feed</title><link>https://example.com</link><description>test</description>
"#,
    );
    for (title, link, description) in entries {
        xml.push_str(&format!(
            "<item><title>{title}</title><link>{link}</link><guid>{link}</guid>\
             <description>{description}</description>\
             <pubDate>Mon, 02 Jun 2025 10:00:00 GMT</pubDate></item>\n"
        ));
    }
    xml.push_str("</channel></rss>\n");
    xml
}

/// An unscored item attributed to `source`, with its identity derived
/// from the URL the way the collector derives it.
pub fn make_item(source: &Source, title: &str, body: &str) -> Item {
    let url = format!("https://example.com/{}", Uuid::new_v4());
    let now = Utc::now();
    Item {
        id: Uuid::new_v4(),
        identity: derive_identity(&url),
        title: title.to_string(),
        body: body.to_string(),
        url,
        source_id: source.id,
        source_name: source.name.clone(),
        published_at: now,
        created_at: now,
        updated_at: now,
        relevance: None,
        sentiment: None,
        state: ItemState::New,
        language: "en".to_string(),
        summary: None,
    }
}
