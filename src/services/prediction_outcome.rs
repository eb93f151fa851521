use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::prediction::{
    AgentPredictionOutcome, EvaluationStats, NewPrediction, OutcomeStatus,
};
use crate::models::watchlist::{KlineItem, Market};
use crate::services::context_store::ContextStore;
use crate::services::history_kline::DailyBarSource;

const MIN_LOOKBACK_DAYS: i64 = 120;
const LOOKBACK_PADDING_DAYS: i64 = 30;
const MAX_LOOKBACK_DAYS: i64 = 600;

/// 解析 YYYY-MM-DD / YYYY/MM/DD（只看前 10 个字符）
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let text = value.trim();
    let head: String = text.chars().take(10).collect();
    ["%Y-%m-%d", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&head, fmt).ok())
}

/// 取日期不晚于 target 的最近一根K线收盘价
pub fn pick_close_on_or_before(klines: &[KlineItem], target: NaiveDate) -> Option<f64> {
    klines
        .iter()
        .filter(|k| k.close.is_finite())
        .filter_map(|k| parse_day(&k.date).map(|d| (d, k.close)))
        .filter(|(d, _)| *d <= target)
        .max_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

/// 单次评估内的K线缓存，按 (symbol, market) 复用，评估结束即丢弃
#[derive(Default)]
struct KlineCache {
    series: HashMap<(String, Market), Vec<KlineItem>>,
}

impl KlineCache {
    async fn get_or_fetch(
        &mut self,
        source: &dyn DailyBarSource,
        symbol: &str,
        market: Market,
        lookback_days: usize,
    ) -> &[KlineItem] {
        let key = (symbol.to_string(), market);
        if !self.series.contains_key(&key) {
            let bars = match source.daily_bars(symbol, market, lookback_days).await {
                Ok(bars) => bars,
                Err(e) => {
                    log::warn!("评估建议获取K线失败: {} {} - {}", symbol, market, e);
                    Vec::new()
                }
            };
            self.series.insert(key.clone(), bars);
        }
        self.series.get(&key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// 建议后验：记录 pending 建议，到期后用实际收盘价评估
pub struct PredictionEvaluator {
    store: ContextStore,
    bars: Arc<dyn DailyBarSource>,
}

impl PredictionEvaluator {
    pub fn new(store: ContextStore, bars: Arc<dyn DailyBarSource>) -> Self {
        Self { store, bars }
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    pub fn record_prediction(&self, prediction: &NewPrediction) -> Option<i64> {
        let mut p = prediction.clone();
        p.horizon_days = p.horizon_days.max(1);
        p.stock_market = Market::parse_or_default(&p.stock_market).as_str().to_string();
        self.store.save_agent_prediction_outcome(&p)
    }

    pub fn list_pending(&self, today: NaiveDate, max_horizon_days: i64, limit: usize) -> Vec<AgentPredictionOutcome> {
        self.store
            .list_pending_prediction_outcomes(today, max_horizon_days, limit)
    }

    /// 评估到期的 pending 建议。`now` 为配置时区下的当前时间，
    /// 同时决定"今天"和写入的 evaluated_at。
    ///
    /// 已是终态的记录不会出现在待评估列表中，重复执行只会处理剩余的 pending 记录。
    pub async fn evaluate_pending(&self, now: NaiveDateTime, max_horizon_days: i64, limit: usize) -> EvaluationStats {
        let today = now.date();
        let pending = self.list_pending(today, max_horizon_days, limit);
        let mut stats = EvaluationStats {
            total_pending: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return stats;
        }

        let mut cache = KlineCache::default();
        let evaluated_at = now.format("%Y-%m-%d %H:%M:%S").to_string();

        for rec in &pending {
            let Some(pred_day) = parse_day(&rec.prediction_date) else {
                log::warn!("建议日期无法解析，跳过: id={} date={}", rec.id, rec.prediction_date);
                stats.skipped_invalid_date += 1;
                continue;
            };

            let Some(target_day) = pred_day.checked_add_days(Days::new(rec.horizon_days.max(1) as u64)) else {
                log::warn!(
                    "建议到期日超出日期范围，跳过: id={} date={} horizon={}",
                    rec.id,
                    rec.prediction_date,
                    rec.horizon_days
                );
                stats.skipped_invalid_date += 1;
                continue;
            };
            if target_day > today {
                stats.skipped_not_due += 1;
                continue;
            }
            stats.eligible += 1;

            let market = Market::parse_or_default(&rec.stock_market);
            let lookback = ((today - pred_day).num_days() + LOOKBACK_PADDING_DAYS)
                .max(MIN_LOOKBACK_DAYS)
                .min(MAX_LOOKBACK_DAYS) as usize;
            let klines = cache
                .get_or_fetch(self.bars.as_ref(), &rec.stock_symbol, market, lookback)
                .await;

            let Some(outcome_price) = pick_close_on_or_before(klines, target_day) else {
                stats.skipped_no_price += 1;
                continue;
            };

            let base_price = rec
                .trigger_price
                .filter(|p| p.is_finite() && *p > 0.0)
                .or_else(|| pick_close_on_or_before(klines, pred_day));

            let marked = match base_price {
                Some(base) if base > 0.0 => {
                    let ret = (outcome_price - base) / base * 100.0;
                    self.store.mark_agent_prediction_outcome(
                        rec.id,
                        Some(outcome_price),
                        Some(ret),
                        OutcomeStatus::Evaluated,
                        &evaluated_at,
                    )
                }
                _ => self.store.mark_agent_prediction_outcome(
                    rec.id,
                    Some(outcome_price),
                    None,
                    OutcomeStatus::NoBasePrice,
                    &evaluated_at,
                ),
            };
            if marked {
                stats.evaluated += 1;
            }
        }

        log::info!(
            "建议后验评估完成: pending={} eligible={} evaluated={} not_due={} invalid_date={} no_price={}",
            stats.total_pending,
            stats.eligible,
            stats.evaluated,
            stats.skipped_not_due,
            stats.skipped_invalid_date,
            stats.skipped_no_price
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::database::Database;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBars {
        bars: Vec<KlineItem>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DailyBarSource for FixedBars {
        async fn daily_bars(&self, _symbol: &str, _market: Market, _days: usize) -> Result<Vec<KlineItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.bars.clone())
        }
    }

    fn bar(date: &str, close: f64) -> KlineItem {
        KlineItem {
            date: date.into(),
            open: close,
            close,
            high: close,
            low: close,
            volume: 0.0,
            change_pct: 0.0,
        }
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        day(s).and_hms_opt(15, 30, 0).unwrap()
    }

    fn prediction(date: &str, horizon: i64, trigger: Option<f64>) -> NewPrediction {
        NewPrediction {
            agent_name: "daily_report".into(),
            stock_symbol: "600519".into(),
            stock_market: "CN".into(),
            prediction_date: date.into(),
            horizon_days: horizon,
            action: "buy".into(),
            action_label: "买入".into(),
            confidence: Some(0.7),
            trigger_price: trigger,
            meta: json!({}),
        }
    }

    fn evaluator(bars: Vec<KlineItem>) -> (PredictionEvaluator, Arc<FixedBars>) {
        let store = ContextStore::new(Arc::new(Database::open_in_memory().unwrap()));
        let source = Arc::new(FixedBars {
            bars,
            calls: AtomicUsize::new(0),
        });
        (PredictionEvaluator::new(store, source.clone()), source)
    }

    #[test]
    fn test_parse_day_formats() {
        assert_eq!(parse_day("2024-01-05"), Some(day("2024-01-05")));
        assert_eq!(parse_day("2024/01/05 15:00"), Some(day("2024-01-05")));
        assert_eq!(parse_day("2024-01-05T09:30:00"), Some(day("2024-01-05")));
        assert_eq!(parse_day("01-05"), None);
        assert_eq!(parse_day(""), None);
    }

    #[test]
    fn test_pick_close_on_or_before() {
        let bars = vec![bar("2024-01-02", 10.0), bar("2024-01-05", 11.0), bar("2024-01-03", 12.0)];
        assert_eq!(pick_close_on_or_before(&bars, day("2024-01-04")), Some(12.0));
        assert_eq!(pick_close_on_or_before(&bars, day("2024-01-06")), Some(11.0));
        assert_eq!(pick_close_on_or_before(&bars, day("2024-01-01")), None);
    }

    #[tokio::test]
    async fn test_not_due_until_horizon_passes() {
        let (ev, _) = evaluator(vec![bar("2024-01-05", 110.0)]);
        let id = ev.record_prediction(&prediction("2024-01-01", 5, Some(100.0))).unwrap();

        let stats = ev.evaluate_pending(at("2024-01-03"), 10, 100).await;
        assert_eq!(stats.total_pending, 1);
        assert_eq!(stats.skipped_not_due, 1);
        assert_eq!(stats.eligible, 0);

        let stats = ev.evaluate_pending(at("2024-01-06"), 10, 100).await;
        assert_eq!(stats.eligible, 1);
        assert_eq!(stats.evaluated, 1);

        let rec = ev.store().get_agent_prediction_outcome(id).unwrap();
        assert_eq!(rec.outcome_status, OutcomeStatus::Evaluated);
        assert_eq!(rec.outcome_price, Some(110.0));
        assert!((rec.outcome_return_pct.unwrap() - 10.0).abs() < 1e-9);
        assert!(rec.outcome_status.is_terminal());
        assert_eq!(rec.evaluated_at.as_deref(), Some("2024-01-06 15:30:00"));
    }

    #[tokio::test]
    async fn test_no_base_price_is_terminal() {
        let (ev, _) = evaluator(vec![bar("2024-01-04", 50.0)]);
        let id = ev.record_prediction(&prediction("2024-01-01", 3, None)).unwrap();

        let stats = ev.evaluate_pending(at("2024-01-10"), 10, 100).await;
        assert_eq!(stats.evaluated, 1);
        let rec = ev.store().get_agent_prediction_outcome(id).unwrap();
        assert_eq!(rec.outcome_status, OutcomeStatus::NoBasePrice);
        assert_eq!(rec.outcome_price, Some(50.0));
        assert!(rec.outcome_return_pct.is_none());
    }

    #[tokio::test]
    async fn test_base_price_falls_back_to_close_on_prediction_day() {
        let (ev, _) = evaluator(vec![bar("2024-01-01", 20.0), bar("2024-01-02", 22.0)]);
        let id = ev.record_prediction(&prediction("2024-01-01", 1, Some(0.0))).unwrap();
        ev.evaluate_pending(at("2024-01-05"), 10, 100).await;
        let rec = ev.store().get_agent_prediction_outcome(id).unwrap();
        assert!((rec.outcome_return_pct.unwrap() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_no_price_stays_pending_and_terminal_rows_are_final() {
        let (ev, source) = evaluator(vec![bar("2024-02-01", 12.0)]);
        let waiting = ev.record_prediction(&prediction("2024-01-01", 1, Some(10.0))).unwrap();
        ev.record_prediction(&prediction("2024-01-31", 1, Some(10.0))).unwrap();

        let stats = ev.evaluate_pending(at("2024-02-05"), 10, 100).await;
        assert_eq!(stats.eligible, 2);
        assert_eq!(stats.skipped_no_price, 1);
        assert_eq!(stats.evaluated, 1);
        // 同一 (symbol, market) 在一次评估中只拉一次K线
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let rec = ev.store().get_agent_prediction_outcome(waiting).unwrap();
        assert_eq!(rec.outcome_status, OutcomeStatus::Pending);

        let again = ev.evaluate_pending(at("2024-02-05"), 10, 100).await;
        assert_eq!(again.total_pending, 1);
        assert_eq!(again.evaluated, 0);
    }

    #[tokio::test]
    async fn test_invalid_date_and_horizon_filter() {
        let (ev, _) = evaluator(vec![bar("2024-01-10", 10.0)]);
        ev.record_prediction(&prediction("2024-00-00", 1, Some(10.0))).unwrap();
        ev.record_prediction(&prediction("2024-01-01", 20, Some(10.0))).unwrap();

        let stats = ev.evaluate_pending(at("2024-03-01"), 10, 100).await;
        assert_eq!(stats.total_pending, 1);
        assert_eq!(stats.skipped_invalid_date, 1);
    }

    #[tokio::test]
    async fn test_out_of_range_horizon_is_skipped_without_blocking_later_rows() {
        let (ev, _) = evaluator(vec![bar("2024-01-01", 10.0), bar("2024-01-02", 11.0)]);
        let huge = ev.record_prediction(&prediction("2023-12-01", 100_000_000, Some(10.0))).unwrap();
        let normal = ev.record_prediction(&prediction("2024-01-01", 1, Some(10.0))).unwrap();

        let stats = ev.evaluate_pending(at("2024-06-01"), i64::MAX, 10).await;
        assert_eq!(stats.total_pending, 2);
        assert_eq!(stats.skipped_invalid_date, 1);
        assert_eq!(stats.evaluated, 1);

        let rec = ev.store().get_agent_prediction_outcome(huge).unwrap();
        assert_eq!(rec.outcome_status, OutcomeStatus::Pending);
        assert!(!rec.outcome_status.is_terminal());
        let rec = ev.store().get_agent_prediction_outcome(normal).unwrap();
        assert_eq!(rec.outcome_status, OutcomeStatus::Evaluated);
    }
}
