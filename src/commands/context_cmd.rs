use crate::models::news::NewsItem;
use crate::models::prediction::{
    AgentPredictionOutcome, EvaluationStats, NewPrediction, OutcomeFilter, OutcomeStatus,
};
use crate::models::snapshot::{
    AgentContextRun, CleanupStats, NewsTopicSnapshot, RetentionWindows, StockContextSnapshot,
};
use crate::models::watchlist::Market;
use crate::AppState;

fn clamp_days(days: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    days.unwrap_or(default).clamp(min, max)
}

fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    limit.unwrap_or(default).clamp(1, max)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// 个股近期上下文快照
pub fn list_stock_context_snapshots(
    state: &AppState,
    symbol: String,
    market: Option<String>,
    context_type: Option<String>,
    days: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<StockContextSnapshot>, String> {
    let symbol = symbol.trim().to_string();
    if symbol.is_empty() {
        return Err("股票代码不能为空".to_string());
    }
    let market = Market::parse_or_default(market.as_deref().unwrap_or("CN"));
    let context_type = non_empty(context_type);
    Ok(state.store.get_recent_stock_context_snapshots(
        &symbol,
        market,
        context_type.as_deref(),
        clamp_days(days, 30, 1, 365),
        clamp_limit(limit, 30, 200),
        state.settings.today(),
    ))
}

/// 最新全局新闻主题，不存在时返回 None
pub fn get_latest_news_topic(
    state: &AppState,
    window_days: Option<i64>,
) -> Result<Option<NewsTopicSnapshot>, String> {
    Ok(state
        .store
        .get_latest_news_topic_snapshot(clamp_days(window_days, 7, 1, 90)))
}

pub fn list_agent_context_runs(
    state: &AppState,
    agent_name: Option<String>,
    stock_symbol: Option<String>,
    days: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<AgentContextRun>, String> {
    let agent_name = non_empty(agent_name);
    let stock_symbol = non_empty(stock_symbol);
    Ok(state.store.list_recent_agent_context_runs(
        agent_name.as_deref(),
        stock_symbol.as_deref(),
        clamp_days(days, 30, 1, 365),
        clamp_limit(limit, 50, 300),
        state.settings.today(),
    ))
}

pub fn list_prediction_outcomes(
    state: &AppState,
    agent_name: Option<String>,
    stock_symbol: Option<String>,
    status: Option<String>,
    days: Option<i64>,
    limit: Option<usize>,
) -> Result<Vec<AgentPredictionOutcome>, String> {
    let status = match non_empty(status) {
        Some(s) => Some(OutcomeStatus::parse(&s).ok_or_else(|| format!("未知的后验状态: {}", s))?),
        None => None,
    };
    let filter = OutcomeFilter {
        agent_name: non_empty(agent_name),
        stock_symbol: non_empty(stock_symbol),
        status,
        days: clamp_days(days, 90, 1, 720),
        limit: clamp_limit(limit, 200, 1000),
    };
    Ok(state
        .store
        .list_agent_prediction_outcomes(&filter, state.settings.today()))
}

/// 记录一条建议，返回记录 id
pub fn record_prediction(state: &AppState, prediction: NewPrediction) -> Result<i64, String> {
    if prediction.stock_symbol.trim().is_empty() {
        return Err("股票代码不能为空".to_string());
    }
    state
        .evaluator
        .record_prediction(&prediction)
        .ok_or_else(|| "保存建议记录失败".to_string())
}

/// 手动触发一次后验评估
pub async fn evaluate_predictions(
    state: &AppState,
    max_horizon_days: Option<i64>,
    limit: Option<usize>,
) -> Result<EvaluationStats, String> {
    let max_horizon = clamp_days(max_horizon_days, 10, 1, 30);
    let limit = clamp_limit(limit, 300, 2000);
    log::info!("手动触发建议后验评估: max_horizon={} limit={}", max_horizon, limit);
    Ok(state
        .evaluator
        .evaluate_pending(state.settings.now(), max_horizon, limit)
        .await)
}

/// 手动触发过期清理，各表窗口单独指定
pub fn cleanup_context(
    state: &AppState,
    snapshot_days: Option<i64>,
    topic_days: Option<i64>,
    context_run_days: Option<i64>,
    outcome_days: Option<i64>,
) -> Result<CleanupStats, String> {
    let defaults = RetentionWindows::default();
    let windows = RetentionWindows {
        snapshot_days: clamp_days(snapshot_days, defaults.snapshot_days, 30, 2000),
        topic_days: clamp_days(topic_days, defaults.topic_days, 30, 2000),
        context_run_days: clamp_days(context_run_days, defaults.context_run_days, 30, 2000),
        outcome_days: clamp_days(outcome_days, defaults.outcome_days, 60, 4000),
    };
    log::info!("手动触发上下文数据清理: {:?}", windows);
    Ok(state
        .store
        .cleanup_context_data(&windows, state.settings.today()))
}

/// 保存一条分析记录（历史新闻层的来源）
pub fn save_analysis_news(
    state: &AppState,
    agent_name: String,
    analysis_date: String,
    news: Vec<NewsItem>,
) -> Result<i64, String> {
    let raw = serde_json::json!({ "news": news });
    state
        .store
        .save_analysis_record(&agent_name, "*", &analysis_date, &raw)
        .ok_or_else(|| "保存分析记录失败".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_days(None, 30, 1, 365), 30);
        assert_eq!(clamp_days(Some(0), 30, 1, 365), 1);
        assert_eq!(clamp_days(Some(9999), 180, 30, 2000), 2000);
        assert_eq!(clamp_limit(Some(0), 30, 200), 1);
        assert_eq!(clamp_limit(Some(500), 30, 200), 200);
        assert_eq!(non_empty(Some("  ".into())), None);
    }
}
