use crate::models::context::{BreakoutState, PriceHistoryFeatures, TrendState};
use crate::models::watchlist::{KlineItem, Market};
use crate::services::history_kline::DailyBarSource;

pub const NO_KLINE_DATA: &str = "无K线数据";
/// 突破判定的容差带 0.2%
const BREAKOUT_TOLERANCE: f64 = 0.002;
const MIN_FETCH_DAYS: usize = 80;
/// 中期支撑/压力回看交易日
const MEDIUM_TERM_SESSIONS: usize = 60;

fn pct(current: Option<f64>, base: Option<f64>) -> Option<f64> {
    match (current, base) {
        (Some(a), Some(b)) if b != 0.0 => Some((a - b) / b * 100.0),
        _ => None,
    }
}

/// 样本标准差（N-1）
fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.max(0.0).sqrt())
}

fn trailing(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn calc_ma_last(data: &[f64], period: usize) -> Option<f64> {
    if data.len() < period || period == 0 {
        return None;
    }
    Some(trailing(data, period).iter().sum::<f64>() / period as f64)
}

/// 均线排列描述
pub fn ma_trend_label(closes: &[f64]) -> String {
    let ma5 = calc_ma_last(closes, 5);
    let ma10 = calc_ma_last(closes, 10);
    let ma20 = calc_ma_last(closes, 20);
    let ma60 = calc_ma_last(closes, 60);

    let aligned = match (ma5, ma10, ma20, ma60) {
        (Some(a), Some(b), Some(c), Some(d)) => {
            if a > b && b > c && c > d {
                Some(true)
            } else if a < b && b < c && c < d {
                Some(false)
            } else {
                None
            }
        }
        (Some(a), Some(b), Some(c), None) => {
            if a > b && b > c {
                Some(true)
            } else if a < b && b < c {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    };

    match aligned {
        Some(true) => "均线多头排列".to_string(),
        Some(false) => "均线空头排列".to_string(),
        None => "均线纠缠".to_string(),
    }
}

pub fn trend_state_from_label(label: &str) -> TrendState {
    if label.contains("多头") {
        TrendState::Bullish
    } else if label.contains("空头") {
        TrendState::Bearish
    } else {
        TrendState::Neutral
    }
}

pub fn breakout_state(current: f64, high_20: f64, low_20: f64) -> BreakoutState {
    if current >= high_20 * (1.0 - BREAKOUT_TOLERANCE) {
        BreakoutState::NearHighBreakout
    } else if current <= low_20 * (1.0 + BREAKOUT_TOLERANCE) {
        BreakoutState::NearLowBreakdown
    } else {
        BreakoutState::None
    }
}

/// 由日K线序列（旧 -> 新）计算收益率/波动率/突破特征。
/// `trend_label` 为空时按均线排列生成
pub fn analyze_price_history(klines: &[KlineItem], trend_label: Option<&str>) -> PriceHistoryFeatures {
    if klines.is_empty() {
        return PriceHistoryFeatures::unavailable(NO_KLINE_DATA);
    }

    let closes: Vec<f64> = klines.iter().map(|k| k.close).filter(|c| c.is_finite()).collect();
    let highs: Vec<f64> = klines.iter().map(|k| k.high).filter(|c| c.is_finite()).collect();
    let lows: Vec<f64> = klines.iter().map(|k| k.low).filter(|c| c.is_finite()).collect();
    let current = closes.last().copied();

    let back = |n: usize| -> Option<f64> {
        if closes.len() > n {
            Some(closes[closes.len() - 1 - n])
        } else {
            None
        }
    };
    let ret_5d = pct(current, back(5));
    let ret_20d = pct(current, back(20));
    let ret_60d = pct(current, back(60));

    let daily_rets: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    let volatility_20d = stdev(trailing(&daily_rets, 20));

    let high_20d = max_of(trailing(&highs, 20));
    let low_20d = min_of(trailing(&lows, 20));

    let breakout = match (current, high_20d, low_20d) {
        (Some(c), Some(h), Some(l)) => breakout_state(c, h, l),
        _ => BreakoutState::None,
    };

    let trend = match trend_label {
        Some(label) if !label.trim().is_empty() => label.to_string(),
        _ => ma_trend_label(&closes),
    };

    PriceHistoryFeatures {
        available: true,
        error: None,
        asof: klines.last().map(|k| k.date.clone()),
        trend_state: Some(trend_state_from_label(&trend)),
        trend: Some(trend),
        ret_5d,
        ret_20d,
        ret_60d,
        volatility_20d,
        high_20d,
        low_20d,
        breakout_state: Some(breakout),
        support_m: min_of(trailing(&lows, MEDIUM_TERM_SESSIONS)),
        resistance_m: max_of(trailing(&highs, MEDIUM_TERM_SESSIONS)),
    }
}

/// 拉取日K线并计算特征。数据源失败或无数据时返回 available=false
pub async fn build_kline_history_context(
    source: &dyn DailyBarSource,
    symbol: &str,
    market: Market,
    lookback_days: usize,
) -> PriceHistoryFeatures {
    match source.daily_bars(symbol, market, lookback_days.max(MIN_FETCH_DAYS)).await {
        Ok(klines) => analyze_price_history(&klines, None),
        Err(e) => {
            log::warn!("获取历史K线失败: {} {} - {}", symbol, market, e);
            PriceHistoryFeatures::unavailable(NO_KLINE_DATA)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(closes: &[f64]) -> Vec<KlineItem> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| KlineItem {
                date: format!("2024-01-{:02}", i + 1),
                open: *c,
                close: *c,
                high: *c,
                low: *c,
                volume: 1000.0,
                change_pct: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_ret_5d_uses_close_five_sessions_back() {
        let closes: Vec<f64> = (10..=20).map(|v| v as f64).collect();
        let f = analyze_price_history(&bars(&closes), None);
        let expected = (20.0 - 15.0) / 15.0 * 100.0;
        assert!((f.ret_5d.unwrap() - expected).abs() < 1e-9);
        assert!(f.ret_20d.is_none());
        assert!(f.ret_60d.is_none());
    }

    #[test]
    fn test_ret_5d_none_with_short_history() {
        let f = analyze_price_history(&bars(&[10.0, 11.0, 12.0, 13.0, 14.0]), None);
        assert!(f.available);
        assert!(f.ret_5d.is_none());
    }

    #[test]
    fn test_zero_base_guard() {
        let f = analyze_price_history(&bars(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]), None);
        assert!(f.ret_5d.is_none());
    }

    #[test]
    fn test_volatility_sample_stdev() {
        // 日收益 +10%, -10%
        let f = analyze_price_history(&bars(&[10.0, 11.0, 9.9]), None);
        let expected = stdev(&[10.0, -10.0]).unwrap();
        assert!((f.volatility_20d.unwrap() - expected).abs() < 1e-9);
        assert!((expected - 200f64.sqrt()).abs() < 1e-9);

        let single = analyze_price_history(&bars(&[10.0, 11.0]), None);
        assert!(single.volatility_20d.is_none());
    }

    #[test]
    fn test_breakout_states() {
        assert_eq!(breakout_state(9.99, 10.0, 8.0), BreakoutState::NearHighBreakout);
        assert_eq!(breakout_state(8.01, 10.0, 8.0), BreakoutState::NearLowBreakdown);
        assert_eq!(breakout_state(9.0, 10.0, 8.0), BreakoutState::None);

        let closes: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        let f = analyze_price_history(&bars(&closes), None);
        assert_eq!(f.breakout_state, Some(BreakoutState::NearHighBreakout));
        assert_eq!(f.high_20d, Some(30.0));
        assert_eq!(f.low_20d, Some(11.0));
    }

    #[test]
    fn test_trend_label_and_state() {
        let up: Vec<f64> = (1..=30).map(|v| v as f64).collect();
        let f = analyze_price_history(&bars(&up), None);
        assert_eq!(f.trend.as_deref(), Some("均线多头排列"));
        assert_eq!(f.trend_state, Some(TrendState::Bullish));

        let down: Vec<f64> = (1..=30).rev().map(|v| v as f64).collect();
        assert_eq!(analyze_price_history(&bars(&down), None).trend_state, Some(TrendState::Bearish));

        let f = analyze_price_history(&bars(&up), Some("震荡整理"));
        assert_eq!(f.trend_state, Some(TrendState::Neutral));
    }

    #[test]
    fn test_empty_series_unavailable() {
        let f = analyze_price_history(&[], None);
        assert!(!f.available);
        assert_eq!(f.error.as_deref(), Some(NO_KLINE_DATA));
        assert!(f.ret_5d.is_none());
        assert!(f.breakout_state.is_none());
    }
}
