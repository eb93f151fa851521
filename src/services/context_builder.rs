use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::models::context::{
    ContextPack, Coverage, DataQuality, NewsLayers, PortfolioConstraints, PositionSummary,
    PriceHistoryFeatures, QualityOverview, QualityTrend, RiskBudgetHint, SnapshotMemory,
    SymbolContext,
};
use crate::models::news::{NewsItem, TopicSummary};
use crate::models::settings::ContextSettings;
use crate::models::snapshot::{AnalysisRecord, NewTopicSnapshot, StockContextSnapshot};
use crate::models::watchlist::{Market, PortfolioView, SignalPack, WatchStock};
use crate::services::context_store::ContextStore;
use crate::services::history_kline::DailyBarSource;
use crate::services::kline_context::build_kline_history_context;
use crate::services::news_ranker::{
    dedupe_news_items, parse_news_time_in_year, rank_news_items, summarize_news_topics,
    DEFAULT_MAX_TOPICS,
};
use crate::utils::run_context::RunContext;

/// 历史新闻层的来源 Agent
pub const HISTORY_NEWS_AGENTS: &[&str] = &["news_digest", "premarket_outlook", "daily_report"];
const HISTORY_RECORD_LIMIT: usize = 30;
const MEMORY_SAMPLE_LIMIT: usize = 12;
const MEMORY_MIN_DAYS: i64 = 30;
const MEMORY_TREND_DELTA: i32 = 5;

const REALTIME_CAP: usize = 8;
const EXTENDED_CAP: usize = 12;
const HISTORY_CAP: usize = 15;
const EVENTS_CAP: usize = 8;
/// 全局主题每只股票取 实时/历史 各前 N 条
const GLOBAL_TOPIC_PER_LAYER: usize = 5;

/// 一次构建的窗口参数
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub realtime_hours: i64,
    pub extended_hours: i64,
    pub history_days: i64,
    pub kline_days: usize,
    /// 跨天记忆回看天数，实际窗口不少于 history_days 且不少于 30 天
    pub memory_days: i64,
    /// false 时只构建不落库（盘中临时扫描）
    pub persist_snapshot: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            realtime_hours: 12,
            extended_hours: 72,
            history_days: 7,
            kline_days: 120,
            memory_days: MEMORY_MIN_DAYS,
            persist_snapshot: true,
        }
    }
}

impl BuildOptions {
    pub fn memory_window_days(&self) -> i64 {
        self.memory_days.max(self.history_days).max(MEMORY_MIN_DAYS)
    }
}

impl From<&ContextSettings> for BuildOptions {
    fn from(s: &ContextSettings) -> Self {
        Self {
            realtime_hours: s.realtime_hours,
            extended_hours: s.extended_hours,
            history_days: s.history_days,
            kline_days: s.kline_days,
            memory_days: s.memory_days,
            persist_snapshot: true,
        }
    }
}

/// 数据质量评分：满分 100，按缺失项扣分
pub fn estimate_quality_score(coverage: &Coverage) -> i32 {
    let mut score = 100;
    if !coverage.quote {
        score -= 35;
    }
    if !coverage.technical {
        score -= 25;
    }
    if !coverage.kline_history {
        score -= 10;
    }
    if !coverage.news_realtime {
        score -= 15;
    }
    if !coverage.news_extended {
        score -= 10;
    }
    if !coverage.history_news {
        score -= 10;
    }
    if !coverage.events {
        score -= 5;
    }
    score.clamp(0, 100)
}

/// 保留发布时间在 `now - hours` 之后的新闻，时间无法解析的丢弃。
/// 窗口超出可表示的时间范围时不设下限
pub fn cut_by_hours(items: &[NewsItem], hours: i64, now: NaiveDateTime) -> Vec<NewsItem> {
    let cutoff = Duration::try_hours(hours.max(1)).and_then(|d| now.checked_sub_signed(d));
    items
        .iter()
        .filter(|it| {
            parse_news_time_in_year(&it.time, now.year())
                .map(|ts| cutoff.map_or(true, |c| ts >= c))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

fn json_str(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn json_importance(v: Option<&Value>) -> u8 {
    let level = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    level.clamp(0.0, 3.0) as u8
}

/// 从历史分析记录中挑出与该股票相关的新闻。
/// 记录里没有 news 列表时，读取 context_payload.<symbol>.news 的分层新闻
pub fn history_news_from_records(records: &[AnalysisRecord], symbol: &str, stock_name: &str) -> Vec<NewsItem> {
    let mut out = Vec::new();
    for record in records {
        let mut items: Vec<&Value> = record
            .raw_data
            .get("news")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().collect())
            .unwrap_or_default();

        if items.is_empty() {
            if let Some(layered) = record
                .raw_data
                .get("context_payload")
                .and_then(|p| p.get(symbol))
                .and_then(|p| p.get("news"))
            {
                for bucket in ["realtime", "extended", "history"] {
                    if let Some(rows) = layered.get(bucket).and_then(|v| v.as_array()) {
                        items.extend(rows.iter());
                    }
                }
            }
        }

        for it in items {
            let Some(obj) = it.as_object() else { continue };
            let symbols_value = obj.get("symbols");
            let listed: Option<Vec<String>> = symbols_value.and_then(|v| v.as_array()).map(|arr| {
                arr.iter()
                    .filter_map(|s| s.as_str().map(|s| s.to_string()))
                    .collect()
            });
            let title = json_str(obj.get("title"));
            let content = json_str(obj.get("content"));

            let matched = (!symbol.is_empty()
                && listed.as_ref().map(|l| l.iter().any(|s| s == symbol)).unwrap_or(false))
                || (!symbol.is_empty() && title.contains(symbol))
                || (!stock_name.is_empty() && format!("{} {}", title, content).contains(stock_name));
            if !matched {
                continue;
            }

            let source = match json_str(obj.get("source")) {
                s if s.is_empty() => "news_digest".to_string(),
                s => s,
            };
            let time = match json_str(obj.get("publish_time")) {
                t if t.is_empty() => json_str(obj.get("time")),
                t => t,
            };
            let symbols = match (listed, symbols_value) {
                (Some(l), _) => l,
                (None, None) | (None, Some(Value::Null)) => Vec::new(),
                (None, Some(_)) => vec![symbol.to_string()],
            };

            out.push(NewsItem {
                source,
                external_id: json_str(obj.get("external_id")),
                title,
                content,
                time,
                importance: json_importance(obj.get("importance")),
                url: json_str(obj.get("url")),
                symbols,
            });
        }
    }
    dedupe_news_items(out)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 账户约束：单股持仓占比与风险预算提示
pub fn build_portfolio_constraints(portfolio: &PortfolioView, symbol: &str) -> PortfolioConstraints {
    let agg = portfolio.aggregated_position(symbol);
    let total_cost = portfolio.total_cost;

    let ratio = match agg {
        Some(p) if total_cost > 0.0 => p.total_cost / total_cost,
        _ => 0.0,
    };

    PortfolioConstraints {
        has_position: agg.is_some(),
        position: agg.map(|p| PositionSummary {
            symbol: p.symbol.clone(),
            name: p.name.clone(),
            market: p.market,
            total_quantity: p.total_quantity,
            avg_cost: p.avg_cost,
            total_cost: p.total_cost,
            trading_style: p.trading_style.clone(),
            positions: p.positions.clone(),
        }),
        total_available_funds: portfolio.total_available_funds,
        total_cost,
        account_count: portfolio.account_count,
        single_position_ratio: round_to(ratio, 4),
        risk_budget_hint: RiskBudgetHint::from_ratio(ratio),
    }
}

/// 由近期同类型快照（新 -> 旧）推导跨天记忆。无快照时返回 None
pub fn build_snapshot_memory(rows: &[StockContextSnapshot], window_days: i64) -> Option<SnapshotMemory> {
    let latest = rows.first()?;

    let scores: Vec<i32> = rows.iter().filter_map(|r| r.quality_score()).collect();
    let last_topic = rows
        .iter()
        .filter_map(|r| r.payload.pointer("/news/history_topic/summary").and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .unwrap_or_default();
    let last_breakout = rows
        .iter()
        .filter_map(|r| r.payload.pointer("/kline_history/breakout_state").and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .unwrap_or_default();

    let latest_score = scores.first().copied().unwrap_or(0);
    let avg = if scores.is_empty() {
        0.0
    } else {
        round_to(scores.iter().sum::<i32>() as f64 / scores.len() as f64, 1)
    };

    // 只比较最新与最旧样本
    let trend = match (scores.first(), scores.last()) {
        (Some(first), Some(last)) if scores.len() >= 2 => {
            let delta = first - last;
            if delta >= MEMORY_TREND_DELTA {
                QualityTrend::Improving
            } else if delta <= -MEMORY_TREND_DELTA {
                QualityTrend::Deteriorating
            } else {
                QualityTrend::Flat
            }
        }
        _ => QualityTrend::Flat,
    };

    Some(SnapshotMemory {
        window_days: window_days.max(1),
        sample_count: rows.len(),
        latest_snapshot_date: latest.snapshot_date.clone(),
        latest_quality_score: latest_score,
        avg_quality_score: avg,
        quality_trend: trend,
        latest_history_topic: last_topic.to_string(),
        last_breakout_state: last_breakout.to_string(),
    })
}

fn quality_overview(contexts: &[&SymbolContext], global_topic: TopicSummary) -> QualityOverview {
    let scores: Vec<i32> = contexts.iter().map(|c| c.data_quality.score).collect();
    let avg = if scores.is_empty() {
        0.0
    } else {
        round_to(scores.iter().sum::<i32>() as f64 / scores.len() as f64, 1)
    };
    QualityOverview {
        avg_score: avg,
        min_score: scores.iter().copied().min().unwrap_or(0),
        max_score: scores.iter().copied().max().unwrap_or(0),
        global_news_topic: global_topic,
        symbol_count: contexts.len(),
    }
}

/// 审计用的精简载荷：每只股票只保留评分与覆盖情况
fn condensed_run_payload(pack: &ContextPack) -> Value {
    let mut symbols = Map::new();
    for (symbol, ctx) in &pack.symbols {
        symbols.insert(
            symbol.clone(),
            json!({
                "score": ctx.data_quality.score,
                "coverage": ctx.data_quality.coverage,
                "counts": {
                    "realtime": ctx.data_quality.realtime_news_count,
                    "extended": ctx.data_quality.extended_news_count,
                    "history": ctx.data_quality.history_news_count,
                },
                "history_topic": ctx.news.history_topic.summary,
            }),
        );
    }
    json!({
        "symbols": Value::Object(symbols),
        "quality_overview": pack.quality_overview,
    })
}

/// 统一构建 Agent 上下文：分层新闻 + 历史K线 + 账户约束 + 跨天记忆 + 质量评分
pub struct ContextBuilder {
    store: ContextStore,
    bars: Arc<dyn DailyBarSource>,
    kline_cache: Mutex<HashMap<(String, Market, usize), PriceHistoryFeatures>>,
}

impl ContextBuilder {
    pub fn new(store: ContextStore, bars: Arc<dyn DailyBarSource>) -> Self {
        Self {
            store,
            bars,
            kline_cache: Mutex::new(HashMap::new()),
        }
    }

    /// 同一构建器实例内按 (symbol, market, days) 缓存K线特征
    async fn kline_history(&self, symbol: &str, market: Market, days: usize) -> PriceHistoryFeatures {
        let key = (symbol.to_string(), market, days);
        if let Some(hit) = self.kline_cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return hit;
        }
        let features = build_kline_history_context(self.bars.as_ref(), symbol, market, days).await;
        if let Ok(mut cache) = self.kline_cache.lock() {
            cache.insert(key, features.clone());
        }
        features
    }

    fn load_history_news(&self, symbol: &str, stock_name: &str, days: i64, today: NaiveDate) -> Vec<NewsItem> {
        let records = self
            .store
            .list_analysis_records(HISTORY_NEWS_AGENTS, days, HISTORY_RECORD_LIMIT, today);
        history_news_from_records(&records, symbol, stock_name)
    }

    fn snapshot_memory(
        &self,
        symbol: &str,
        market: Market,
        context_type: &str,
        days: i64,
        today: NaiveDate,
    ) -> Option<SnapshotMemory> {
        let days = days.max(1);
        let rows = self.store.get_recent_stock_context_snapshots(
            symbol,
            market,
            Some(context_type),
            days,
            MEMORY_SAMPLE_LIMIT,
            today,
        );
        build_snapshot_memory(&rows, days)
    }

    fn log_degraded(ctx: &RunContext, symbol: &str, pack: &SignalPack) {
        let sources = [
            ("行情", pack.quote.degraded_reason()),
            ("技术面", pack.technical.degraded_reason()),
            ("资金流向", pack.capital_flow.degraded_reason()),
            ("事件", pack.events.degraded_reason()),
            ("新闻", pack.news.degraded_reason()),
        ];
        for (name, reason) in sources {
            if let Some(reason) = reason {
                log::warn!("{} {} {}数据缺失: {}", ctx.log_prefix(), symbol, name, reason);
            }
        }
    }

    /// 为自选股逐只构建上下文并（可选）落库。
    ///
    /// 单只股票的数据源失败只影响其覆盖率和评分；落库失败只记录日志，
    /// 返回的内存结果不受影响。
    pub async fn build_symbol_contexts(
        &self,
        ctx: &RunContext,
        watchlist: &[WatchStock],
        packs: &HashMap<String, SignalPack>,
        portfolio: &PortfolioView,
        opts: &BuildOptions,
    ) -> ContextPack {
        let now = ctx.started_at;
        let today = now.date();
        let snapshot_date = ctx.snapshot_date();
        let context_type = ctx.agent_name.as_str();
        let empty_pack = SignalPack::default();

        let mut symbols = BTreeMap::new();
        let mut all_news_for_topic: Vec<NewsItem> = Vec::new();

        for stock in watchlist {
            let symbol = stock.symbol.as_str();
            let market = stock.market;
            let stock_name = stock.display_name().to_string();
            let pack = match packs.get(symbol) {
                Some(p) => {
                    Self::log_degraded(ctx, symbol, p);
                    p
                }
                None => {
                    log::warn!("{} {} 无采集数据", ctx.log_prefix(), symbol);
                    &empty_pack
                }
            };

            let live_news = pack.news_list();
            let realtime = rank_news_items(
                dedupe_news_items(cut_by_hours(live_news, opts.realtime_hours, now)),
                symbol,
                now.year(),
            );
            let extended = rank_news_items(
                dedupe_news_items(cut_by_hours(live_news, opts.extended_hours, now)),
                symbol,
                now.year(),
            );
            let history = rank_news_items(
                self.load_history_news(symbol, &stock_name, opts.history_days, today),
                symbol,
                now.year(),
            );
            let history_topic = summarize_news_topics(&history, DEFAULT_MAX_TOPICS);

            let kline_history = self.kline_history(symbol, market, opts.kline_days).await;
            let constraints = build_portfolio_constraints(portfolio, symbol);
            let memory = self.snapshot_memory(
                symbol,
                market,
                context_type,
                opts.memory_window_days(),
                today,
            );

            let coverage = Coverage {
                quote: pack.has_quote(),
                technical: pack.has_technical(),
                events: pack.has_events(),
                news_realtime: !realtime.is_empty(),
                news_extended: !extended.is_empty(),
                history_news: !history.is_empty(),
                kline_history: kline_history.available,
            };
            let data_quality = DataQuality {
                score: estimate_quality_score(&coverage),
                coverage,
                realtime_news_count: realtime.len(),
                extended_news_count: extended.len(),
                history_news_count: history.len(),
            };

            all_news_for_topic.extend(realtime.iter().take(GLOBAL_TOPIC_PER_LAYER).cloned());
            all_news_for_topic.extend(history.iter().take(GLOBAL_TOPIC_PER_LAYER).cloned());

            let context = SymbolContext {
                symbol: symbol.to_string(),
                name: stock_name,
                market,
                technical_current: pack.technical_value(),
                kline_history,
                news: NewsLayers {
                    realtime: realtime.into_iter().take(REALTIME_CAP).collect(),
                    extended: extended.into_iter().take(EXTENDED_CAP).collect(),
                    history: history.into_iter().take(HISTORY_CAP).collect(),
                    history_topic,
                },
                events: pack.events_list().iter().take(EVENTS_CAP).cloned().collect(),
                constraints,
                memory,
                data_quality,
            };

            if opts.persist_snapshot {
                self.store.save_stock_context_snapshot(
                    symbol,
                    market,
                    &snapshot_date,
                    context_type,
                    &context,
                    &context.data_quality,
                );
            }

            symbols.insert(symbol.to_string(), context);
        }

        let news_count = all_news_for_topic.len();
        let global_topic = summarize_news_topics(
            &rank_news_items(dedupe_news_items(all_news_for_topic), "", now.year()),
            DEFAULT_MAX_TOPICS,
        );

        if opts.persist_snapshot {
            self.store.save_news_topic_snapshot(&NewTopicSnapshot {
                snapshot_date: snapshot_date.clone(),
                window_days: opts.history_days.max(1),
                symbols: watchlist.iter().map(|s| s.symbol.clone()).collect(),
                summary: global_topic.summary.clone(),
                topics: global_topic.topics.clone(),
                sentiment: global_topic.sentiment,
                coverage: json!({
                    "stock_count": watchlist.len(),
                    "news_count": news_count,
                }),
            });
        }

        let contexts: Vec<&SymbolContext> = symbols.values().collect();
        let overview = quality_overview(&contexts, global_topic);
        let pack = ContextPack {
            symbols,
            quality_overview: overview,
        };

        if opts.persist_snapshot {
            self.store.save_agent_context_run(
                context_type,
                None,
                &snapshot_date,
                &condensed_run_payload(&pack),
                &pack.quality_overview,
            );
        }

        log::info!(
            "{} 上下文构建完成: {} 只股票, 平均质量 {:.1} (最低 {}, 最高 {})",
            ctx.log_prefix(),
            pack.quality_overview.symbol_count,
            pack.quality_overview.avg_score,
            pack.quality_overview.min_score,
            pack.quality_overview.max_score
        );
        pack
    }
}
