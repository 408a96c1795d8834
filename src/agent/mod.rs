//! Orchestrator - wires collaborators into conversation turns and the
//! dividend analysis batch
//!
//! CHAT:    RATE LIMIT → ADVANCE
//! ANALYZE: RATE LIMIT → FETCH (memoized) → METRICS (memoized) → RANK →
//!          COMMENTARY (memoized) → RENDER

pub mod session;

pub use session::{FlowKind, Session, TurnReply};

use crate::cache::{build_store, Memoizer, RateLimitPolicy, RateLimiter};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::dialogue::{advance, AssistantFlow, Flow, OrderFlow};
use crate::error::AgentError;
use crate::finance::{
    calc_metrics_from_raw, rank, BrapiClient, MarkdownReportRenderer, MetricsSource, Recommender,
    ReportRenderer, ThresholdRecommender,
};
use crate::llm::{build_generator, PromptTemplate, Responder};
use crate::models::{AnalysisReport, ConversationState, RankingEntry, ScoredItem, TickerMetrics};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_PERIOD: &str = "1y";

const COMMENTARY_TEMPLATE: &str = "Você é um analista de dividendos do mercado brasileiro.\n\
     Com base no ranking abaixo (período {periodo}), escreva um comentário curto em português \
     destacando a melhor oportunidade e os pontos de atenção de cada ativo. \
     Não invente números além dos fornecidos.\n\n{ranking}";

/// Main orchestrator that coordinates conversations and analyses
pub struct Orchestrator {
    responder: Arc<Responder>,
    memoizer: Arc<Memoizer>,
    rate_limiter: RateLimiter,
    source: Arc<dyn MetricsSource>,
    recommender: Arc<dyn Recommender>,
    renderer: Arc<dyn ReportRenderer>,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
    assistant: AssistantFlow,
    order: OrderFlow,
}

impl Orchestrator {
    pub fn new(
        responder: Arc<Responder>,
        memoizer: Arc<Memoizer>,
        rate_limiter: RateLimiter,
        source: Arc<dyn MetricsSource>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            assistant: AssistantFlow::new(responder.clone()),
            order: OrderFlow::new(responder.clone()),
            responder,
            memoizer,
            rate_limiter,
            source,
            recommender: Arc::new(ThresholdRecommender::default()),
            renderer: Arc::new(MarkdownReportRenderer::new("reports")),
            clock,
            cache_ttl,
        }
    }

    pub fn with_recommender(mut self, recommender: Arc<dyn Recommender>) -> Self {
        self.recommender = recommender;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Build every collaborator from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = build_store(config, clock.clone());
        let memoizer = Arc::new(Memoizer::new(store.clone()));
        let generator = build_generator(config)?;
        let responder = Arc::new(Responder::new(generator, memoizer.clone(), config.cache_ttl));
        let rate_limiter = RateLimiter::new(
            store,
            clock.clone(),
            RateLimitPolicy {
                limit: config.rate_limit,
                window_secs: config.rate_window_secs,
            },
        );
        let source = Arc::new(BrapiClient::new(
            config.brapi_base_url.clone(),
            config.brapi_token.clone(),
        )?);

        let policy = rate_limiter.policy();
        info!(
            model = %responder.model(),
            rate_limit = policy.limit,
            rate_window_secs = policy.window_secs,
            buy_threshold = config.buy_threshold,
            "Orchestrator initialized"
        );

        Ok(
            Self::new(responder, memoizer, rate_limiter, source, clock, config.cache_ttl)
                .with_recommender(Arc::new(ThresholdRecommender::buy_hold(config.buy_threshold)))
                .with_renderer(Arc::new(MarkdownReportRenderer::new(config.reports_dir.clone()))),
        )
    }

    pub fn assistant(&self) -> &AssistantFlow {
        &self.assistant
    }

    pub fn order(&self) -> &OrderFlow {
        &self.order
    }

    pub fn memoizer(&self) -> &Memoizer {
        &self.memoizer
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    //
    // ================= Conversations =================
    //

    /// Rate-limited turn on `state`. A rejected or cancelled turn leaves
    /// `state` untouched; the new state is committed only once the turn ends.
    pub async fn chat_turn<F: Flow>(
        &self,
        flow: &F,
        subject: &str,
        state: &mut ConversationState<F::Stage, F::Data>,
        input: &str,
    ) -> Result<()> {
        self.rate_limiter.check(&format!("session:{}", subject)).await?;

        *state = advance(flow, state.clone(), input).await;
        Ok(())
    }

    /// Rate-limited turn on a session of either flow.
    pub async fn converse(&self, subject: &str, session: &mut Session, input: &str) -> Result<()> {
        match session {
            Session::Assistant(state) => self.chat_turn(&self.assistant, subject, state, input).await,
            Session::Order(state) => self.chat_turn(&self.order, subject, state, input).await,
        }
    }

    //
    // ================= Dividend analysis =================
    //

    /// Rank `tickers` by trailing dividend yield and render a report.
    ///
    /// Only the rate limit aborts the batch; a ticker whose data cannot be
    /// fetched becomes a placeholder row at the end of the ranking.
    pub async fn analyze_tickers(
        &self,
        user_id: &str,
        tickers: &[String],
        period: &str,
    ) -> Result<AnalysisReport> {
        let start_time = Instant::now();
        self.rate_limiter.check(&format!("user:{}", user_id)).await?;

        let tickers = normalize_tickers(tickers);
        if tickers.is_empty() {
            return Err(AgentError::InputEmpty);
        }
        let period = match period.trim() {
            "" => DEFAULT_PERIOD,
            p => p,
        };

        info!(user_id, tickers = ?tickers, period, "Starting dividend analysis");

        let mut scored = Vec::with_capacity(tickers.len());
        let mut unavailable = Vec::new();
        for ticker in &tickers {
            match self.ticker_metrics(ticker, period).await {
                Ok(metrics) => scored.push(scored_item(ticker, &metrics)),
                Err(error) => {
                    warn!(ticker = %ticker, %error, "Ticker data unavailable");
                    unavailable.push(RankingEntry::unavailable(ticker.as_str(), error.to_string()));
                }
            }
        }

        let mut ranking = rank(scored, self.recommender.as_ref());
        ranking.extend(unavailable);

        let commentary = self.commentary(&ranking, period).await;

        let mut report = AnalysisReport {
            period: period.to_string(),
            ranking,
            commentary,
            report_path: None,
            created_at: self.clock.now(),
        };

        match self.renderer.render(&report).await {
            Ok(path) => report.report_path = Some(path),
            Err(error) => warn!(%error, "Report rendering failed"),
        }

        info!(
            user_id,
            entries = report.ranking.len(),
            best = report.best().map(|e| e.ticker_id.as_str()).unwrap_or("-"),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            cache_hit_rate = self.memoizer.stats().hit_rate(),
            "Dividend analysis complete"
        );

        Ok(report)
    }

    async fn ticker_metrics(&self, ticker: &str, period: &str) -> Result<TickerMetrics> {
        let metrics_key = format!("metrics:{}:{}", ticker, period);
        let raw_key = format!("rawdata:{}:{}", ticker, period);
        let now = self.clock.now();

        self.memoizer
            .get_or_compute(&metrics_key, self.cache_ttl, || async move {
                let raw: Value = self
                    .memoizer
                    .get_or_compute(&raw_key, self.cache_ttl, || {
                        self.source.fetch_raw(ticker, period)
                    })
                    .await?;
                debug!(ticker, period, "Computing metrics");
                calc_metrics_from_raw(&raw, now)
            })
            .await
    }

    async fn commentary(&self, ranking: &[RankingEntry], period: &str) -> String {
        let available: Vec<&RankingEntry> = ranking.iter().filter(|e| e.available).collect();
        if available.is_empty() {
            return "Nenhum dado disponível para os tickers informados.".to_string();
        }

        let lines = available
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                format!(
                    "{}. {}: dividend yield {:.2}% ({})",
                    i + 1,
                    entry.ticker_id,
                    entry.score,
                    entry.label
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = PromptTemplate::new(COMMENTARY_TEMPLATE)
            .render(&[("periodo", period), ("ranking", lines.as_str())]);

        match self.responder.reply(&prompt).await {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "Commentary generation failed");
                "Desculpe, não foi possível gerar o comentário automático neste momento. \
                 O ranking acima continua válido."
                    .to_string()
            }
        }
    }
}

/// Trim, uppercase and drop empty or repeated tickers, keeping first-seen order.
fn normalize_tickers(tickers: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for ticker in tickers {
        let ticker = ticker.trim().to_uppercase();
        if !ticker.is_empty() && !seen.contains(&ticker) {
            seen.push(ticker);
        }
    }
    seen
}

fn scored_item(ticker: &str, metrics: &TickerMetrics) -> ScoredItem {
    let mut item = ScoredItem::new(ticker, metrics.dividend_yield);
    item.metadata
        .insert("current_price".to_string(), json!(metrics.current_price));
    item.metadata
        .insert("dividends_12m".to_string(), json!(metrics.dividends_12m));
    item.metadata
        .insert("payment_count".to_string(), json!(metrics.payment_count));
    item
}
