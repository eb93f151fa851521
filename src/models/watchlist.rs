use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::news::NewsItem;

/// 市场代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Market {
    #[default]
    #[serde(rename = "CN")]
    CN,
    #[serde(rename = "HK")]
    HK,
    #[serde(rename = "US")]
    US,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::CN => "CN",
            Market::HK => "HK",
            Market::US => "US",
        }
    }

    /// 解析市场代码，未知或空值回退为 CN
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "HK" => Market::HK,
            "US" => Market::US,
            _ => Market::CN,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 自选股条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchStock {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market: Market,
}

impl WatchStock {
    pub fn new(symbol: &str, name: &str, market: Market) -> Self {
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            market,
        }
    }

    /// 名称为空时用代码代替
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.symbol
        } else {
            &self.name
        }
    }
}

/// K线单条数据（日线，旧 -> 新）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineItem {
    pub date: String,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    #[serde(default)]
    pub change_pct: f64,
}

/// 采集结果：成功或降级（附原因）
///
/// 覆盖率标记只从这里推导，不依赖异常分支。
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
    Ok(T),
    Degraded(String),
}

impl<T> Fetched<T> {
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Fetched::Ok(v) => Some(v),
            Fetched::Degraded(_) => None,
        }
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Fetched::Ok(_) => None,
            Fetched::Degraded(reason) => Some(reason),
        }
    }
}

impl<T> Default for Fetched<T> {
    fn default() -> Self {
        Fetched::Degraded("未采集".to_string())
    }
}

/// 单只股票的采集数据包（行情/技术面/资金/事件/新闻）
#[derive(Debug, Clone, Default)]
pub struct SignalPack {
    pub quote: Fetched<Value>,
    pub technical: Fetched<Value>,
    pub capital_flow: Fetched<Value>,
    pub events: Fetched<Vec<Value>>,
    pub news: Fetched<Vec<NewsItem>>,
}

impl SignalPack {
    pub fn has_quote(&self) -> bool {
        self.quote.as_ok().map(is_present).unwrap_or(false)
    }

    /// 技术面带 error 标记视为不可用
    pub fn has_technical(&self) -> bool {
        match self.technical.as_ok() {
            Some(v) => is_present(v) && !v.get("error").map(is_present).unwrap_or(false),
            None => false,
        }
    }

    pub fn has_events(&self) -> bool {
        self.events.as_ok().map(|e| !e.is_empty()).unwrap_or(false)
    }

    pub fn technical_value(&self) -> Value {
        self.technical
            .as_ok()
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn events_list(&self) -> &[Value] {
        self.events.as_ok().map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn news_list(&self) -> &[NewsItem] {
        self.news.as_ok().map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn is_present(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

/// 单个账户中的持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PositionRow {
    pub account_id: i64,
    #[serde(default)]
    pub account_name: String,
    pub quantity: f64,
    pub cost_price: f64,
    #[serde(default)]
    pub trading_style: String,
}

/// 跨账户聚合后的单只股票持仓
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregatedPosition {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub market: Market,
    pub total_quantity: f64,
    pub avg_cost: f64,
    pub total_cost: f64,
    #[serde(default)]
    pub trading_style: String,
    #[serde(default)]
    pub positions: Vec<PositionRow>,
}

/// 账户组合只读视图
#[derive(Debug, Clone, Default)]
pub struct PortfolioView {
    pub positions: HashMap<String, AggregatedPosition>,
    pub account_count: usize,
    pub total_available_funds: f64,
    pub total_cost: f64,
}

impl PortfolioView {
    pub fn aggregated_position(&self, symbol: &str) -> Option<&AggregatedPosition> {
        self.positions.get(symbol)
    }
}
