use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::watchlist::{KlineItem, Market};
use crate::utils::http::build_stock_client;
use crate::utils::retry::retry_with_backoff;

const QQ_KLINE_URL: &str = "https://web.ifzq.gtimg.cn/appstock/app/fqkline/get";
/// 腾讯接口单次最多约 640 条
const MAX_PER_REQUEST: usize = 640;

/// 日K线数据源（旧 -> 新排序）
#[async_trait]
pub trait DailyBarSource: Send + Sync {
    async fn daily_bars(&self, symbol: &str, market: Market, days: usize) -> Result<Vec<KlineItem>>;
}

pub struct HistoryKlineService {
    client: reqwest::Client,
    max_retries: u32,
}

impl HistoryKlineService {
    pub fn new() -> Result<Self> {
        let client = build_stock_client()?;
        Ok(Self { client, max_retries: 2 })
    }

    /// 从腾讯接口拉取前复权日K线数据
    /// code: sh600519 / sz000001 / hk00700 / usAAPL
    async fn fetch_kline(&self, code: &str, count: usize) -> Result<Vec<KlineItem>> {
        let param = format!("{},day,,,{},qfq", code, count.min(MAX_PER_REQUEST));
        let url = format!("{}?param={}", QQ_KLINE_URL, param);

        let resp = self.client.get(&url).send().await?.error_for_status()?;
        let text = resp.text().await?;

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| anyhow!("腾讯K线数据JSON解析失败: {}", e))?;
        parse_kline_payload(&json, code)
    }
}

#[async_trait]
impl DailyBarSource for HistoryKlineService {
    async fn daily_bars(&self, symbol: &str, market: Market, days: usize) -> Result<Vec<KlineItem>> {
        let code = to_qq_code(symbol, market);
        let label = format!("K线 {}", code);
        retry_with_backoff(&label, self.max_retries, || self.fetch_kline(&code, days)).await
    }
}

/// 解析腾讯K线响应。前复权数据在 qfqday 字段，指数/港美股可能在 day 字段
pub fn parse_kline_payload(json: &serde_json::Value, code: &str) -> Result<Vec<KlineItem>> {
    let code_key = code.to_lowercase();
    let data = json
        .get("data")
        .and_then(|d| d.get(&code_key).or_else(|| d.get(code)))
        .ok_or_else(|| anyhow!("腾讯K线数据中未找到 {} 的数据", code))?;

    let klines = data
        .get("qfqday")
        .or_else(|| data.get("day"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("腾讯K线数据中未找到 qfqday 字段"))?;

    let mut items = Vec::with_capacity(klines.len());
    for kline in klines {
        if let Some(arr) = kline.as_array() {
            if arr.len() >= 6 {
                items.push(KlineItem {
                    date: arr[0].as_str().unwrap_or("").to_string(),
                    open: parse_kline_f64(&arr[1]),
                    close: parse_kline_f64(&arr[2]),
                    high: parse_kline_f64(&arr[3]),
                    low: parse_kline_f64(&arr[4]),
                    volume: parse_kline_f64(&arr[5]),
                    change_pct: 0.0,
                });
            }
        }
    }

    for i in 1..items.len() {
        let prev_close = items[i - 1].close;
        if prev_close > 0.0 {
            items[i].change_pct = (items[i].close - prev_close) / prev_close * 100.0;
        }
    }

    Ok(items)
}

/// 代码转换为腾讯格式
pub fn to_qq_code(symbol: &str, market: Market) -> String {
    let s = symbol.trim();
    let lower = s.to_lowercase();
    match market {
        Market::CN => {
            if lower.starts_with("sh") || lower.starts_with("sz") || lower.starts_with("bj") {
                return lower;
            }
            let prefix = match s.chars().next() {
                Some('6') | Some('9') | Some('5') => "sh",
                Some('4') | Some('8') => "bj",
                _ => "sz",
            };
            format!("{}{}", prefix, s)
        }
        Market::HK => {
            let digits = lower.trim_start_matches("hk");
            format!("hk{:0>5}", digits)
        }
        Market::US => {
            let ticker = s.strip_prefix("us").or_else(|| s.strip_prefix("US")).unwrap_or(s);
            format!("us{}", ticker.to_uppercase())
        }
    }
}

fn parse_kline_f64(val: &serde_json::Value) -> f64 {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().unwrap_or(0.0),
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_qq_code() {
        assert_eq!(to_qq_code("600519", Market::CN), "sh600519");
        assert_eq!(to_qq_code("000001", Market::CN), "sz000001");
        assert_eq!(to_qq_code("300750", Market::CN), "sz300750");
        assert_eq!(to_qq_code("830799", Market::CN), "bj830799");
        assert_eq!(to_qq_code("SH600519", Market::CN), "sh600519");
        assert_eq!(to_qq_code("700", Market::HK), "hk00700");
        assert_eq!(to_qq_code("aapl", Market::US), "usAAPL");
    }

    #[test]
    fn test_parse_payload_computes_change_pct() {
        let payload = json!({
            "data": {
                "sh600519": {
                    "qfqday": [
                        ["2024-03-01", "10.0", "10.0", "10.5", "9.8", "1000"],
                        ["2024-03-04", "10.0", "11.0", "11.2", "9.9", "1200"]
                    ]
                }
            }
        });
        let items = parse_kline_payload(&payload, "sh600519").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].close, 11.0);
        assert!((items[1].change_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_payload_missing_code_is_error() {
        let payload = json!({"data": {}});
        assert!(parse_kline_payload(&payload, "sz000001").is_err());
    }
}
