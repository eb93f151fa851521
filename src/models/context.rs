use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::news::{NewsItem, TopicSummary};
use super::watchlist::{Market, PositionRow};

/// 20 日高低点突破状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutState {
    #[default]
    None,
    NearHighBreakout,
    NearLowBreakdown,
}

/// 趋势状态（由趋势描述中的"多头"/"空头"推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

/// 历史K线特征。`available = false` 时其余字段一律视为缺失
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PriceHistoryFeatures {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub asof: Option<String>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub trend_state: Option<TrendState>,
    #[serde(default)]
    pub ret_5d: Option<f64>,
    #[serde(default)]
    pub ret_20d: Option<f64>,
    #[serde(default)]
    pub ret_60d: Option<f64>,
    #[serde(default)]
    pub volatility_20d: Option<f64>,
    #[serde(default)]
    pub high_20d: Option<f64>,
    #[serde(default)]
    pub low_20d: Option<f64>,
    #[serde(default)]
    pub breakout_state: Option<BreakoutState>,
    #[serde(default)]
    pub support_m: Option<f64>,
    #[serde(default)]
    pub resistance_m: Option<f64>,
}

impl PriceHistoryFeatures {
    pub fn unavailable(reason: &str) -> Self {
        Self {
            available: false,
            error: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

/// 各数据源覆盖情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Coverage {
    pub quote: bool,
    pub technical: bool,
    pub events: bool,
    pub news_realtime: bool,
    pub news_extended: bool,
    pub history_news: bool,
    pub kline_history: bool,
}

impl Coverage {
    pub fn full() -> Self {
        Self {
            quote: true,
            technical: true,
            events: true,
            news_realtime: true,
            news_extended: true,
            history_news: true,
            kline_history: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataQuality {
    pub score: i32,
    pub coverage: Coverage,
    pub realtime_news_count: usize,
    pub extended_news_count: usize,
    pub history_news_count: usize,
}

/// 分层新闻
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewsLayers {
    pub realtime: Vec<NewsItem>,
    pub extended: Vec<NewsItem>,
    pub history: Vec<NewsItem>,
    pub history_topic: TopicSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskBudgetHint {
    Strict,
    Normal,
    #[default]
    Relaxed,
}

impl RiskBudgetHint {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.35 {
            RiskBudgetHint::Strict
        } else if ratio >= 0.20 {
            RiskBudgetHint::Normal
        } else {
            RiskBudgetHint::Relaxed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PositionSummary {
    pub symbol: String,
    pub name: String,
    pub market: Market,
    pub total_quantity: f64,
    pub avg_cost: f64,
    pub total_cost: f64,
    pub trading_style: String,
    pub positions: Vec<PositionRow>,
}

/// 账户约束
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PortfolioConstraints {
    pub has_position: bool,
    pub position: Option<PositionSummary>,
    pub total_available_funds: f64,
    pub total_cost: f64,
    pub account_count: usize,
    pub single_position_ratio: f64,
    pub risk_budget_hint: RiskBudgetHint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QualityTrend {
    Improving,
    Deteriorating,
    #[default]
    Flat,
}

/// 跨天记忆：同类型近期快照的质量走势
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SnapshotMemory {
    pub window_days: i64,
    pub sample_count: usize,
    pub latest_snapshot_date: String,
    pub latest_quality_score: i32,
    pub avg_quality_score: f64,
    pub quality_trend: QualityTrend,
    pub latest_history_topic: String,
    pub last_breakout_state: String,
}

/// 单只股票的完整上下文（即快照 payload）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolContext {
    pub symbol: String,
    pub name: String,
    pub market: Market,
    pub technical_current: Value,
    pub kline_history: PriceHistoryFeatures,
    pub news: NewsLayers,
    pub events: Vec<Value>,
    pub constraints: PortfolioConstraints,
    pub memory: Option<SnapshotMemory>,
    pub data_quality: DataQuality,
}

/// 一次构建中所有股票的质量概览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QualityOverview {
    pub avg_score: f64,
    pub min_score: i32,
    pub max_score: i32,
    pub global_news_topic: TopicSummary,
    pub symbol_count: usize,
}

/// 上下文构建结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextPack {
    pub symbols: BTreeMap<String, SymbolContext>,
    pub quality_overview: QualityOverview,
}
