use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::db::database::{CleanupCutoffs, Database};
use crate::models::prediction::{AgentPredictionOutcome, NewPrediction, OutcomeFilter, OutcomeStatus};
use crate::models::snapshot::{
    AgentContextRun, AnalysisRecord, CleanupStats, NewTopicSnapshot, NewsTopicSnapshot,
    RetentionWindows, StockContextSnapshot,
};
use crate::models::watchlist::Market;
use crate::utils::json_safe::{to_jsonable, truncate_chars};

const AGENT_NAME_MAX_CHARS: usize = 64;
const ALL_SYMBOLS: &str = "*";

/// `today - max(days, 1)`，格式 YYYY-MM-DD
pub fn cutoff_date(today: NaiveDate, days: i64) -> String {
    today
        .checked_sub_days(Days::new(days.max(1) as u64))
        .unwrap_or(NaiveDate::MIN)
        .format("%Y-%m-%d")
        .to_string()
}

/// 上下文数据持久化边界。
///
/// 写操作返回是否成功，读操作失败时返回空结果；错误只记录日志，不向调用方抛出。
#[derive(Clone)]
pub struct ContextStore {
    db: Arc<Database>,
}

impl ContextStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn save_stock_context_snapshot<P: Serialize, Q: Serialize>(
        &self,
        symbol: &str,
        market: Market,
        snapshot_date: &str,
        context_type: &str,
        payload: &P,
        quality: &Q,
    ) -> bool {
        let payload = to_jsonable(payload);
        let quality = to_jsonable(quality);
        match self.db.upsert_stock_context_snapshot(
            symbol,
            market.as_str(),
            snapshot_date,
            context_type,
            &payload,
            &quality,
        ) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("保存上下文快照失败: {} {} {} - {}", symbol, snapshot_date, context_type, e);
                false
            }
        }
    }

    pub fn get_recent_stock_context_snapshots(
        &self,
        symbol: &str,
        market: Market,
        context_type: Option<&str>,
        days: i64,
        limit: usize,
        today: NaiveDate,
    ) -> Vec<StockContextSnapshot> {
        let cutoff = cutoff_date(today, days);
        self.db
            .get_recent_stock_context_snapshots(symbol, market.as_str(), context_type, &cutoff, limit.max(1))
            .unwrap_or_else(|e| {
                log::warn!("读取上下文快照失败: {} - {}", symbol, e);
                Vec::new()
            })
    }

    pub fn save_news_topic_snapshot(&self, topic: &NewTopicSnapshot) -> bool {
        let mut topic = topic.clone();
        topic.window_days = topic.window_days.max(1);
        topic.coverage = to_jsonable(&topic.coverage);
        match self.db.upsert_news_topic_snapshot(&topic) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("保存新闻主题快照失败: {} - {}", topic.snapshot_date, e);
                false
            }
        }
    }

    pub fn get_latest_news_topic_snapshot(&self, window_days: i64) -> Option<NewsTopicSnapshot> {
        self.db
            .get_latest_news_topic_snapshot(window_days)
            .unwrap_or_else(|e| {
                log::warn!("读取新闻主题快照失败: window={} - {}", window_days, e);
                None
            })
    }

    /// 追加一条 Agent 上下文运行记录，symbol 为空时记为 "*"
    pub fn save_agent_context_run<P: Serialize, Q: Serialize>(
        &self,
        agent_name: &str,
        stock_symbol: Option<&str>,
        analysis_date: &str,
        context_payload: &P,
        quality: &Q,
    ) -> bool {
        let agent = truncate_chars(agent_name, AGENT_NAME_MAX_CHARS);
        let symbol = stock_symbol.filter(|s| !s.trim().is_empty()).unwrap_or(ALL_SYMBOLS);
        match self.db.insert_agent_context_run(
            &agent,
            symbol,
            analysis_date,
            &to_jsonable(context_payload),
            &to_jsonable(quality),
        ) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("保存Agent上下文运行记录失败: {} - {}", agent, e);
                false
            }
        }
    }

    pub fn list_recent_agent_context_runs(
        &self,
        agent_name: Option<&str>,
        stock_symbol: Option<&str>,
        days: i64,
        limit: usize,
        today: NaiveDate,
    ) -> Vec<AgentContextRun> {
        let cutoff = cutoff_date(today, days);
        self.db
            .list_recent_agent_context_runs(agent_name, stock_symbol, &cutoff, limit.max(1))
            .unwrap_or_else(|e| {
                log::warn!("读取Agent上下文运行记录失败: {}", e);
                Vec::new()
            })
    }

    /// 记录一条 pending 建议，返回新记录 id；失败返回 None
    pub fn save_agent_prediction_outcome(&self, prediction: &NewPrediction) -> Option<i64> {
        let meta = to_jsonable(&prediction.meta);
        match self.db.insert_prediction_outcome(prediction, &meta) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!(
                    "保存建议后验记录失败: {} {} - {}",
                    prediction.agent_name,
                    prediction.stock_symbol,
                    e
                );
                None
            }
        }
    }

    /// 写入终态。记录不存在或已是终态时返回 false
    pub fn mark_agent_prediction_outcome(
        &self,
        id: i64,
        outcome_price: Option<f64>,
        outcome_return_pct: Option<f64>,
        status: OutcomeStatus,
        evaluated_at: &str,
    ) -> bool {
        match self
            .db
            .mark_prediction_outcome(id, outcome_price, outcome_return_pct, status, evaluated_at)
        {
            Ok(changed) => changed,
            Err(e) => {
                log::warn!("更新建议后验记录失败: id={} - {}", id, e);
                false
            }
        }
    }

    pub fn list_pending_prediction_outcomes(
        &self,
        today: NaiveDate,
        max_horizon_days: i64,
        limit: usize,
    ) -> Vec<AgentPredictionOutcome> {
        let today = today.format("%Y-%m-%d").to_string();
        self.db
            .list_pending_prediction_outcomes(&today, max_horizon_days, limit)
            .unwrap_or_else(|e| {
                log::warn!("读取待评估建议失败: {}", e);
                Vec::new()
            })
    }

    pub fn list_agent_prediction_outcomes(
        &self,
        filter: &OutcomeFilter,
        today: NaiveDate,
    ) -> Vec<AgentPredictionOutcome> {
        let cutoff = cutoff_date(today, filter.days);
        let filter = OutcomeFilter {
            limit: filter.limit.max(1),
            ..filter.clone()
        };
        self.db
            .list_prediction_outcomes(&filter, &cutoff)
            .unwrap_or_else(|e| {
                log::warn!("读取建议后验记录失败: {}", e);
                Vec::new()
            })
    }

    pub fn get_agent_prediction_outcome(&self, id: i64) -> Option<AgentPredictionOutcome> {
        self.db.get_prediction_outcome(id).unwrap_or_else(|e| {
            log::warn!("读取建议后验记录失败: id={} - {}", id, e);
            None
        })
    }

    pub fn save_analysis_record(
        &self,
        agent_name: &str,
        stock_symbol: &str,
        analysis_date: &str,
        raw_data: &Value,
    ) -> Option<i64> {
        self.db
            .save_analysis_record(agent_name, stock_symbol, analysis_date, &to_jsonable(raw_data))
            .map_err(|e| log::warn!("保存分析记录失败: {} - {}", agent_name, e))
            .ok()
    }

    pub fn list_analysis_records(
        &self,
        agent_names: &[&str],
        days: i64,
        limit: usize,
        today: NaiveDate,
    ) -> Vec<AnalysisRecord> {
        let cutoff = cutoff_date(today, days);
        self.db
            .list_analysis_records(agent_names, &cutoff, limit)
            .unwrap_or_else(|e| {
                log::warn!("读取历史分析记录失败: {}", e);
                Vec::new()
            })
    }

    /// 删除早于各自保留窗口的数据，出错时整体回滚并返回全 0
    pub fn cleanup_context_data(&self, windows: &RetentionWindows, today: NaiveDate) -> CleanupStats {
        let cutoffs = CleanupCutoffs {
            snapshot: cutoff_date(today, windows.snapshot_days),
            topic: cutoff_date(today, windows.topic_days),
            context_run: cutoff_date(today, windows.context_run_days),
            outcome: cutoff_date(today, windows.outcome_days),
        };
        match self.db.cleanup_context_data(&cutoffs) {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("清理上下文数据失败: {}", e);
                CleanupStats::default()
            }
        }
    }
}
