//! Report rendering
//!
//! A renderer turns a finished analysis into a downloadable artifact and
//! hands back its path. The bundled renderer writes Markdown.

use crate::error::AgentError;
use crate::models::{AnalysisReport, RankingEntry};
use crate::Result;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[async_trait::async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, report: &AnalysisReport) -> Result<PathBuf>;
}

pub struct MarkdownReportRenderer {
    output_dir: PathBuf,
}

impl MarkdownReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait::async_trait]
impl ReportRenderer for MarkdownReportRenderer {
    async fn render(&self, report: &AnalysisReport) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AgentError::Render(format!("cannot create {:?}: {}", self.output_dir, e)))?;

        let file_name = format!(
            "analise_dividendos_{}.md",
            report.created_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.output_dir.join(file_name);

        tokio::fs::write(&path, render_markdown(report)).await?;
        info!(path = %path.display(), "Report written");

        Ok(path)
    }
}

fn metric(entry: &RankingEntry, key: &str) -> Option<f64> {
    entry.metadata.get(key).and_then(Value::as_f64)
}

/// Markdown body: ranking table, best opportunity, then commentary.
pub fn render_markdown(report: &AnalysisReport) -> String {
    let mut out = String::new();

    out.push_str("# Análise de Dividendos\n\n");
    out.push_str(&format!(
        "Data: {} • Período: {}\n\n",
        report.created_at.format("%d/%m/%Y %H:%M"),
        report.period
    ));

    if report.ranking.is_empty() {
        out.push_str("_Nenhum ativo analisado._\n\n");
    } else {
        out.push_str("## Ranking por Dividend Yield\n\n");
        out.push_str("| Posição | Ticker | Dividend Yield | Preço Atual | Dividendos 12M | Pagamentos | Recomendação |\n");
        out.push_str("|---------|--------|----------------|-------------|----------------|------------|--------------|\n");

        for (i, entry) in report.ranking.iter().enumerate() {
            if !entry.available {
                let reason = entry
                    .metadata
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("dados indisponíveis");
                out.push_str(&format!(
                    "| {} | {} | — | — | — | — | {} ({}) |\n",
                    i + 1,
                    entry.ticker_id,
                    entry.label,
                    reason
                ));
                continue;
            }

            out.push_str(&format!(
                "| {} | {} | {:.2}% | {} | {} | {} | {} |\n",
                i + 1,
                entry.ticker_id,
                entry.score,
                metric(entry, "current_price")
                    .map(|v| format!("R$ {:.2}", v))
                    .unwrap_or_else(|| "—".into()),
                metric(entry, "dividends_12m")
                    .map(|v| format!("R$ {:.2}", v))
                    .unwrap_or_else(|| "—".into()),
                metric(entry, "payment_count")
                    .map(|v| format!("{}", v as u64))
                    .unwrap_or_else(|| "—".into()),
                entry.label,
            ));
        }
        out.push('\n');
    }

    if let Some(best) = report.best() {
        out.push_str("## Melhor Oportunidade\n\n");
        out.push_str(&format!(
            "O ticker **{}** apresenta o melhor dividend yield de **{:.2}%** ao ano",
            best.ticker_id, best.score
        ));
        if let Some(price) = metric(best, "current_price") {
            out.push_str(&format!(", com preço atual de R$ {:.2}", price));
        }
        out.push_str(".\n\n");
    }

    if !report.commentary.trim().is_empty() {
        out.push_str("## Comentário\n\n");
        for paragraph in report.commentary.split("\n\n").filter(|p| !p.trim().is_empty()) {
            out.push_str(paragraph.trim());
            out.push_str("\n\n");
        }
    }

    out.push_str("_Relatório gerado automaticamente pelo Finance Advisor - Dividend Analyst_\n");
    out
}
