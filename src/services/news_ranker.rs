use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::models::news::{NewsItem, Sentiment, SentimentCounts, TopicSummary};

const POSITIVE_HINTS: &[&str] = &[
    "签约", "中标", "增长", "上调", "创新高", "利好", "增持", "回购", "扭亏", "超预期",
];

const NEGATIVE_HINTS: &[&str] = &[
    "下调", "减持", "亏损", "暴跌", "诉讼", "风险", "违规", "处罚", "利空", "退市",
];

/// 标题命中即加分的关键事件词
const SALIENT_KEYWORDS: &[&str] = &[
    "重大", "业绩", "增持", "减持", "停牌", "解禁", "回购", "分红", "快报",
];

const STOP_WORDS: &[&str] = &["公司", "公告", "今日", "消息", "显示", "发布", "表示", "相关"];

pub const NO_TOPIC_SUMMARY: &str = "近期无显著新闻主题";
pub const DEFAULT_MAX_TOPICS: usize = 6;

const FULL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
/// 无年份的月日格式：(分隔符, 格式)
const MONTH_DAY_FORMATS: &[(&str, &str)] = &[
    ("-", "%Y-%m-%d %H:%M:%S"),
    ("-", "%Y-%m-%d %H:%M"),
    ("/", "%Y/%m/%d %H:%M:%S"),
    ("/", "%Y/%m/%d %H:%M"),
];

/// 解析新闻时间。带时区偏移的值统一转为本地 naive 时间
pub fn parse_news_time_in_year(value: &str, current_year: i32) -> Option<NaiveDateTime> {
    let text = value.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    let normalized = text.replace('T', " ").replace('Z', "+00:00");

    for fmt in FULL_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(&normalized, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    for (sep, fmt) in MONTH_DAY_FORMATS {
        let with_year = format!("{}{}{}", current_year, sep, normalized);
        if let Ok(dt) = NaiveDateTime::parse_from_str(&with_year, fmt) {
            return Some(dt);
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.with_timezone(&Local).naive_local());
        }
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f").ok()
}

/// 按 (source, external_id, title) 去重，保留首次出现
pub fn dedupe_news_items(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for it in items {
        let (source, external_id, title) = it.dedupe_key();
        let key = (source.to_string(), external_id.to_string(), title.to_string());
        if seen.insert(key) {
            out.push(it);
        }
    }
    out
}

/// 排序得分：重要性 + 个股关联 + 关键事件词 + 公告
pub fn news_score(item: &NewsItem, symbol: &str) -> i32 {
    let mut s = item.importance as i32 * 5;
    if !symbol.is_empty() && item.symbols.iter().any(|sym| sym == symbol) {
        s += 2;
    }
    if SALIENT_KEYWORDS.iter().any(|k| item.title.contains(k)) {
        s += 2;
    }
    if item.title.contains("公告") {
        s += 1;
    }
    s
}

/// 按 (得分, 时间) 降序排序；时间无法解析的排在同分最后。稳定排序。
///
/// `current_year` 用于补齐月日格式的新闻时间，取本次运行的基准时间
pub fn rank_news_items(items: Vec<NewsItem>, symbol: &str, current_year: i32) -> Vec<NewsItem> {
    let year = current_year;
    let mut keyed: Vec<((i32, i64), NewsItem)> = items
        .into_iter()
        .map(|it| {
            let ts = parse_news_time_in_year(&it.time, year)
                .map(|dt| dt.and_utc().timestamp())
                .unwrap_or(i64::MIN);
            ((news_score(&it, symbol), ts), it)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed.into_iter().map(|(_, it)| it).collect()
}

fn sentiment_from_text(text: &str) -> Sentiment {
    let pos = POSITIVE_HINTS.iter().filter(|k| text.contains(*k)).count();
    let neg = NEGATIVE_HINTS.iter().filter(|k| text.contains(*k)).count();
    if pos > neg {
        Sentiment::Positive
    } else if neg > pos {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

fn topic_word_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fa5}A-Za-z0-9]{2,}").ok())
        .as_ref()
}

/// 主题摘要：标题高频词 + 多数投票情绪
pub fn summarize_news_topics(items: &[NewsItem], max_topics: usize) -> TopicSummary {
    if items.is_empty() {
        return TopicSummary {
            summary: NO_TOPIC_SUMMARY.to_string(),
            topics: vec![],
            sentiment: Sentiment::Neutral,
            counts: SentimentCounts::default(),
        };
    }

    // 词频按首次出现顺序记录，同频时保持先后
    let mut word_order: Vec<String> = Vec::new();
    let mut word_count: HashMap<String, usize> = HashMap::new();
    let mut counts = SentimentCounts::default();

    for it in items {
        let text = format!("{} {}", it.title, it.content);
        match sentiment_from_text(text.trim()) {
            Sentiment::Positive => counts.positive += 1,
            Sentiment::Negative => counts.negative += 1,
            Sentiment::Neutral => counts.neutral += 1,
        }

        if let Some(re) = topic_word_regex() {
            for m in re.find_iter(&it.title) {
                let w = m.as_str();
                if STOP_WORDS.contains(&w) {
                    continue;
                }
                let entry = word_count.entry(w.to_string()).or_insert_with(|| {
                    word_order.push(w.to_string());
                    0
                });
                *entry += 1;
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = word_order
        .into_iter()
        .map(|w| {
            let n = word_count.get(&w).copied().unwrap_or(0);
            (w, n)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let topics: Vec<String> = ranked.into_iter().take(max_topics).map(|(w, _)| w).collect();

    let sentiment = if counts.positive > counts.negative {
        Sentiment::Positive
    } else if counts.negative > counts.positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    let summary = if topics.is_empty() {
        format!("可用新闻较少，整体情绪{}", sentiment.label())
    } else {
        format!("主题集中在：{}；整体情绪{}", topics.join("、"), sentiment.label())
    };

    TopicSummary {
        summary,
        topics,
        sentiment,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: &str, id: &str, title: &str, time: &str, importance: u8) -> NewsItem {
        NewsItem {
            source: source.into(),
            external_id: id.into(),
            title: title.into(),
            time: time.into(),
            importance,
            ..Default::default()
        }
    }

    #[test]
    fn test_dedupe_same_identity() {
        let items = vec![item("a", "1", "T", "", 0), item("a", "1", "T", "", 0)];
        assert_eq!(dedupe_news_items(items).len(), 1);
    }

    #[test]
    fn test_dedupe_keeps_first_and_order() {
        let mut first = item("a", "1", "T", "", 0);
        first.content = "first".into();
        let mut dup = item("a", "1", "T", "", 0);
        dup.content = "dup".into();
        let items = vec![first, item("b", "2", "U", "", 0), dup, item("a", "1", "V", "", 0)];
        let out = dedupe_news_items(items);
        let titles: Vec<&str> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["T", "U", "V"]);
        assert_eq!(out[0].content, "first");
    }

    #[test]
    fn test_score_components() {
        let mut it = item("a", "1", "贵州茅台业绩快报公告", "", 2);
        it.symbols = vec!["600519".into()];
        // 2*5 + 2(个股) + 2(关键词) + 1(公告)
        assert_eq!(news_score(&it, "600519"), 15);
        assert_eq!(news_score(&it, "000001"), 13);
        assert_eq!(news_score(&item("a", "1", "普通消息", "", 0), ""), 0);
    }

    #[test]
    fn test_rank_by_score_then_recency() {
        let items = vec![
            item("a", "1", "普通", "2024-03-01 10:00:00", 0),
            item("a", "2", "普通较新", "2024-03-02 10:00:00", 0),
            item("a", "3", "重大事项", "2024-01-01", 0),
            item("a", "4", "无时间", "not a time", 0),
            item("a", "5", "高重要性", "2023-01-01", 1),
        ];
        let ranked = rank_news_items(items, "", 2024);
        let ids: Vec<&str> = ranked.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["5", "3", "2", "1", "4"]);
    }

    #[test]
    fn test_rank_is_deterministic() {
        let items = vec![
            item("a", "1", "同分A", "", 0),
            item("a", "2", "同分B", "", 0),
            item("a", "3", "同分C", "2024-01-01", 0),
        ];
        let once = rank_news_items(items.clone(), "", 2024);
        let twice = rank_news_items(items, "", 2024);
        assert_eq!(once, twice);
        let ids: Vec<&str> = once.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_parse_time_formats() {
        let full = parse_news_time_in_year("2024-03-05 09:30:00", 2030).unwrap();
        assert_eq!(full.to_string(), "2024-03-05 09:30:00");
        let slash = parse_news_time_in_year("2024/03/05 09:30", 2030).unwrap();
        assert_eq!(slash.to_string(), "2024-03-05 09:30:00");
        let date_only = parse_news_time_in_year("2024-03-05", 2030).unwrap();
        assert_eq!(date_only.to_string(), "2024-03-05 00:00:00");
        let month_day = parse_news_time_in_year("03-05 09:30", 2030).unwrap();
        assert_eq!(month_day.to_string(), "2030-03-05 09:30:00");
        assert!(parse_news_time_in_year("", 2030).is_none());
        assert!(parse_news_time_in_year("昨天", 2030).is_none());
    }

    #[test]
    fn test_parse_time_with_offset_is_localized() {
        let parsed = parse_news_time_in_year("2024-03-05T01:30:00Z", 2030).unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-03-05T01:30:00+00:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_summarize_empty_is_sentinel() {
        let s = summarize_news_topics(&[], DEFAULT_MAX_TOPICS);
        assert_eq!(s.summary, NO_TOPIC_SUMMARY);
        assert!(s.topics.is_empty());
        assert_eq!(s.sentiment, Sentiment::Neutral);
        assert_eq!(s.counts, SentimentCounts::default());
    }

    #[test]
    fn test_summarize_topics_and_sentiment() {
        let items = vec![
            item("a", "1", "茅台 中标 大单", "", 0),
            item("a", "2", "茅台 签约 公司", "", 0),
            item("a", "3", "茅台 减持", "", 0),
        ];
        let s = summarize_news_topics(&items, 2);
        assert_eq!(s.topics, vec!["茅台".to_string(), "中标".to_string()]);
        assert_eq!(s.sentiment, Sentiment::Positive);
        assert_eq!(s.counts.positive, 2);
        assert_eq!(s.counts.negative, 1);
        assert!(s.summary.contains("偏多"));
        assert!(!s.topics.contains(&"公司".to_string()));
    }

    #[test]
    fn test_sentiment_tie_is_neutral() {
        let items = vec![item("a", "1", "增持 减持", "", 0)];
        assert_eq!(summarize_news_topics(&items, 6).sentiment, Sentiment::Neutral);
    }
}
