//! Dividend metrics over a brapi.dev quote document

use crate::error::AgentError;
use crate::models::TickerMetrics;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Compute trailing-twelve-month dividend metrics from a raw quote document.
///
/// Expects `results[0]` with `regularMarketPrice` and
/// `dividendsData.cashDividends[] { paymentDate, rate }`. Payments with a
/// missing or unparsable date, or a zero rate, are ignored.
pub fn calc_metrics_from_raw(document: &Value, now: DateTime<Utc>) -> Result<TickerMetrics> {
    let result = document
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .ok_or_else(|| {
            AgentError::DataUnavailable("unexpected quote payload: results[0] missing".to_string())
        })?;

    let current_price = result
        .get("regularMarketPrice")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    let one_year_ago = now - Duration::days(365);
    let (total, count) = cash_dividends(result)
        .iter()
        .filter_map(|dividend| {
            let paid_at = dividend
                .get("paymentDate")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
                .with_timezone(&Utc);
            let rate = dividend.get("rate").and_then(Value::as_f64).unwrap_or(0.0);
            (paid_at >= one_year_ago && paid_at <= now && rate != 0.0).then_some(rate)
        })
        .fold((0.0, 0u32), |(sum, n), rate| (sum + rate, n + 1));

    let dividend_yield = if current_price > 0.0 {
        round2(total / current_price * 100.0)
    } else {
        0.0
    };

    Ok(TickerMetrics {
        dividend_yield,
        current_price,
        dividends_12m: round2(total),
        payment_count: count,
    })
}

fn cash_dividends(result: &Value) -> &[Value] {
    result
        .get("dividendsData")
        .and_then(|data| data.get("cashDividends"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-10-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_yield_over_trailing_year() {
        let document = json!({
            "results": [{
                "symbol": "PETR4",
                "regularMarketPrice": 40.0,
                "dividendsData": {"cashDividends": [
                    {"paymentDate": "2025-09-22T00:00:00.000Z", "rate": 1.5},
                    {"paymentDate": "2025-03-10T00:00:00.000Z", "rate": 1.5},
                    {"paymentDate": "2024-06-01T00:00:00.000Z", "rate": 9.0},
                    {"paymentDate": "not-a-date", "rate": 2.0},
                    {"rate": 2.0}
                ]}
            }]
        });

        let metrics = calc_metrics_from_raw(&document, now()).unwrap();
        assert_eq!(metrics.dividend_yield, 7.5);
        assert_eq!(metrics.current_price, 40.0);
        assert_eq!(metrics.dividends_12m, 3.0);
        assert_eq!(metrics.payment_count, 2);
    }

    #[test]
    fn test_zero_price_yields_zero() {
        let document = json!({
            "results": [{
                "regularMarketPrice": 0.0,
                "dividendsData": {"cashDividends": [
                    {"paymentDate": "2025-09-22T00:00:00Z", "rate": 1.0}
                ]}
            }]
        });
        let metrics = calc_metrics_from_raw(&document, now()).unwrap();
        assert_eq!(metrics.dividend_yield, 0.0);
        assert_eq!(metrics.payment_count, 1);
    }

    #[test]
    fn test_no_dividends() {
        let document = json!({"results": [{"regularMarketPrice": 12.3}]});
        let metrics = calc_metrics_from_raw(&document, now()).unwrap();
        assert_eq!(metrics.dividend_yield, 0.0);
        assert_eq!(metrics.dividends_12m, 0.0);
    }

    #[test]
    fn test_missing_results_is_data_unavailable() {
        let err = calc_metrics_from_raw(&json!({"results": []}), now()).unwrap_err();
        assert!(matches!(err, AgentError::DataUnavailable(_)));
    }
}
