//! Test doubles shared by unit tests

use crate::agent::Orchestrator;
use crate::cache::{InMemoryStore, Memoizer, RateLimitPolicy, RateLimiter};
use crate::clock::{Clock, ManualClock};
use crate::error::AgentError;
use crate::finance::{MetricsSource, ReportRenderer};
use crate::llm::{Responder, TextGenerator};
use crate::models::{AnalysisReport, Generation};
use crate::Result;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies with scripted answers in order, repeating the last one.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new<'a>(replies: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.replies.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(Generation::new(last.clone()))
    }
}

pub struct FailingGenerator;

#[async_trait::async_trait]
impl TextGenerator for FailingGenerator {
    fn model(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation> {
        Err(AgentError::GenerationFailure("quota exceeded".to_string()))
    }
}

/// Sleeps before answering; for turns that get cancelled mid-generation.
pub struct SlowGenerator(pub Duration);

#[async_trait::async_trait]
impl TextGenerator for SlowGenerator {
    fn model(&self) -> &str {
        "slow"
    }

    async fn generate(&self, _prompt: &str) -> Result<Generation> {
        tokio::time::sleep(self.0).await;
        Ok(Generation::new("tarde demais"))
    }
}

/// Canned brapi-shaped documents keyed by ticker; unknown tickers fail.
#[derive(Default)]
pub struct StubMetricsSource {
    documents: HashMap<String, Value>,
    calls: AtomicUsize,
}

impl StubMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, ticker: &str, document: Value) -> Self {
        self.documents.insert(ticker.to_string(), document);
        self
    }

    /// Ticker priced at `price` with the given dividend payments, each dated
    /// `days_ago` before `now`.
    pub fn with_quote(
        self,
        ticker: &str,
        price: f64,
        payments: &[(f64, i64)],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let cash: Vec<Value> = payments
            .iter()
            .map(|(rate, days_ago)| {
                json!({
                    "rate": rate,
                    "paymentDate": (now - chrono::Duration::days(*days_ago)).to_rfc3339(),
                })
            })
            .collect();
        let document = json!({
            "results": [{
                "symbol": ticker,
                "regularMarketPrice": price,
                "dividendsData": { "cashDividends": cash },
            }]
        });
        self.with_document(ticker, document)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MetricsSource for StubMetricsSource {
    async fn fetch_raw(&self, ticker: &str, _period: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(ticker)
            .cloned()
            .ok_or_else(|| AgentError::DataUnavailable(format!("no quote for {}", ticker)))
    }
}

pub fn memoizer() -> Memoizer {
    Memoizer::new(Arc::new(InMemoryStore::with_system_clock()))
}

pub struct NullRenderer;

#[async_trait::async_trait]
impl ReportRenderer for NullRenderer {
    async fn render(&self, _report: &AnalysisReport) -> Result<PathBuf> {
        Ok(PathBuf::from("relatorio.md"))
    }
}

/// Orchestrator over an in-memory store driven by `clock`, with a one-hour
/// cache TTL and `limit` requests per 60 s window.
pub fn orchestrator(
    generator: Arc<dyn TextGenerator>,
    source: Arc<dyn MetricsSource>,
    clock: &ManualClock,
    limit: u64,
) -> Orchestrator {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = Arc::new(InMemoryStore::new(clock.clone()));
    let memoizer = Arc::new(Memoizer::new(store.clone()));
    let ttl = Duration::from_secs(3600);
    let responder = Arc::new(Responder::new(generator, memoizer.clone(), ttl));
    let rate_limiter = RateLimiter::new(
        store,
        clock.clone(),
        RateLimitPolicy {
            limit,
            window_secs: 60,
        },
    );

    Orchestrator::new(responder, memoizer, rate_limiter, source, clock, ttl)
        .with_renderer(Arc::new(NullRenderer))
}
