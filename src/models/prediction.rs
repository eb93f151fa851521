use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 建议后验状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    #[default]
    Pending,
    Evaluated,
    NoBasePrice,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Pending => "pending",
            OutcomeStatus::Evaluated => "evaluated",
            OutcomeStatus::NoBasePrice => "no_base_price",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(OutcomeStatus::Pending),
            "evaluated" => Some(OutcomeStatus::Evaluated),
            "no_base_price" => Some(OutcomeStatus::NoBasePrice),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OutcomeStatus::Pending)
    }
}

/// 建议后验评估记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPredictionOutcome {
    pub id: i64,
    pub agent_name: String,
    pub stock_symbol: String,
    pub stock_market: String,
    /// YYYY-MM-DD
    pub prediction_date: String,
    pub horizon_days: i64,
    pub action: String,
    pub action_label: String,
    pub confidence: Option<f64>,
    pub trigger_price: Option<f64>,
    pub outcome_price: Option<f64>,
    pub outcome_return_pct: Option<f64>,
    pub outcome_status: OutcomeStatus,
    pub meta: Value,
    pub evaluated_at: Option<String>,
    pub created_at: String,
}

/// 记录一条建议所需参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrediction {
    pub agent_name: String,
    pub stock_symbol: String,
    pub stock_market: String,
    pub prediction_date: String,
    pub horizon_days: i64,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default = "default_action_label")]
    pub action_label: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub trigger_price: Option<f64>,
    #[serde(default)]
    pub meta: Value,
}

fn default_action() -> String { "watch".to_string() }
fn default_action_label() -> String { "观望".to_string() }

/// 单次后验评估统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EvaluationStats {
    pub total_pending: usize,
    pub eligible: usize,
    pub evaluated: usize,
    pub skipped_not_due: usize,
    pub skipped_invalid_date: usize,
    pub skipped_no_price: usize,
}

/// 后验查询过滤条件
#[derive(Debug, Clone, Default)]
pub struct OutcomeFilter {
    pub agent_name: Option<String>,
    pub stock_symbol: Option<String>,
    pub status: Option<OutcomeStatus>,
    pub days: i64,
    pub limit: usize,
}
