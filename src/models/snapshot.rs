use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::news::Sentiment;

/// 股票上下文快照（按 symbol/market/日期/上下文类型唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockContextSnapshot {
    pub id: i64,
    pub symbol: String,
    pub market: String,
    /// YYYY-MM-DD
    pub snapshot_date: String,
    pub context_type: String,
    pub payload: Value,
    pub quality: Value,
    pub created_at: String,
    pub updated_at: String,
}

impl StockContextSnapshot {
    pub fn quality_score(&self) -> Option<i32> {
        self.quality
            .get("score")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
    }
}

/// 新闻主题快照（按日期和窗口唯一）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsTopicSnapshot {
    pub id: i64,
    pub snapshot_date: String,
    pub window_days: i64,
    pub symbols: Vec<String>,
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub coverage: Value,
    pub created_at: String,
}

/// 主题快照写入参数
#[derive(Debug, Clone)]
pub struct NewTopicSnapshot {
    pub snapshot_date: String,
    pub window_days: i64,
    pub symbols: Vec<String>,
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub coverage: Value,
}

/// Agent 每次执行实际使用的上下文（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContextRun {
    pub id: i64,
    pub agent_name: String,
    pub stock_symbol: String,
    pub analysis_date: String,
    pub context_payload: Value,
    pub quality: Value,
    pub created_at: String,
}

/// 历史分析记录（历史新闻层的来源）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: i64,
    pub agent_name: String,
    pub stock_symbol: String,
    pub analysis_date: String,
    pub raw_data: Value,
    pub created_at: String,
}

/// 过期清理各表删除行数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CleanupStats {
    pub stock_context_snapshots: usize,
    pub news_topic_snapshots: usize,
    pub agent_context_runs: usize,
    pub agent_prediction_outcomes: usize,
}

/// 清理窗口（天）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionWindows {
    pub snapshot_days: i64,
    pub topic_days: i64,
    pub context_run_days: i64,
    pub outcome_days: i64,
}

impl Default for RetentionWindows {
    fn default() -> Self {
        Self {
            snapshot_days: 180,
            topic_days: 180,
            context_run_days: 180,
            outcome_days: 365,
        }
    }
}
