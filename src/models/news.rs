use serde::{Deserialize, Serialize};

/// 统一的新闻/公告条目（来自实时采集或历史分析记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NewsItem {
    /// 来源（财联社、东方财富、news_digest ...）
    #[serde(default)]
    pub source: String,
    /// 来源侧唯一标识，可能为空
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// 发布时间原始字符串，格式不固定
    #[serde(default)]
    pub time: String,
    /// 重要性等级 0..=3
    #[serde(default)]
    pub importance: u8,
    #[serde(default)]
    pub url: String,
    /// 关联股票代码
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl NewsItem {
    /// 去重键 (source, external_id, title)
    pub fn dedupe_key(&self) -> (&str, &str, &str) {
        (&self.source, &self.external_id, &self.title)
    }
}

/// 新闻情绪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// 中文描述，用于主题摘要
    pub fn label(&self) -> &'static str {
        match self {
            Sentiment::Positive => "偏多",
            Sentiment::Negative => "偏空",
            Sentiment::Neutral => "中性",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SentimentCounts {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
}

/// 新闻主题摘要（关键词 + 情绪）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TopicSummary {
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub counts: SentimentCounts,
}
