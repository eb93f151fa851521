use serde::{Deserialize, Serialize};

use super::snapshot::RetentionWindows;

/// 上下文构建与维护任务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// IANA 时区名，决定"今天"与每日清理时间
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_realtime_hours")]
    pub realtime_hours: i64,
    #[serde(default = "default_extended_hours")]
    pub extended_hours: i64,
    #[serde(default = "default_history_days")]
    pub history_days: i64,
    #[serde(default = "default_kline_days")]
    pub kline_days: usize,
    #[serde(default = "default_memory_days")]
    pub memory_days: i64,
    #[serde(default = "default_eval_interval")]
    pub eval_interval_hours: u64,
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,
    #[serde(default = "default_cleanup_minute")]
    pub cleanup_minute: u32,
    #[serde(default = "default_snapshot_retention")]
    pub snapshot_retention_days: i64,
    #[serde(default = "default_outcome_retention")]
    pub outcome_retention_days: i64,
    #[serde(default = "default_eval_max_horizon")]
    pub eval_max_horizon_days: i64,
    #[serde(default = "default_eval_limit")]
    pub eval_limit: usize,
}

fn default_timezone() -> String { "Asia/Shanghai".to_string() }
fn default_realtime_hours() -> i64 { 12 }
fn default_extended_hours() -> i64 { 72 }
fn default_history_days() -> i64 { 7 }
fn default_kline_days() -> usize { 120 }
fn default_memory_days() -> i64 { 30 }
fn default_eval_interval() -> u64 { 6 }
fn default_cleanup_hour() -> u32 { 4 }
fn default_cleanup_minute() -> u32 { 15 }
fn default_snapshot_retention() -> i64 { 180 }
fn default_outcome_retention() -> i64 { 365 }
fn default_eval_max_horizon() -> i64 { 10 }
fn default_eval_limit() -> usize { 300 }

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            realtime_hours: default_realtime_hours(),
            extended_hours: default_extended_hours(),
            history_days: default_history_days(),
            kline_days: default_kline_days(),
            memory_days: default_memory_days(),
            eval_interval_hours: default_eval_interval(),
            cleanup_hour: default_cleanup_hour(),
            cleanup_minute: default_cleanup_minute(),
            snapshot_retention_days: default_snapshot_retention(),
            outcome_retention_days: default_outcome_retention(),
            eval_max_horizon_days: default_eval_max_horizon(),
            eval_limit: default_eval_limit(),
        }
    }
}

impl ContextSettings {
    /// 把越界配置收敛到允许范围
    pub fn normalized(mut self) -> Self {
        self.realtime_hours = self.realtime_hours.max(1);
        self.extended_hours = self.extended_hours.max(1);
        self.history_days = self.history_days.max(1);
        self.memory_days = self.memory_days.max(self.history_days).max(30);
        self.eval_interval_hours = self.eval_interval_hours.max(1);
        self.cleanup_hour = self.cleanup_hour.min(23);
        self.cleanup_minute = self.cleanup_minute.min(59);
        self.snapshot_retention_days = self.snapshot_retention_days.max(30);
        self.outcome_retention_days = self.outcome_retention_days.max(60);
        self.eval_max_horizon_days = self.eval_max_horizon_days.max(1);
        self.eval_limit = self.eval_limit.max(1);
        self
    }

    /// 快照/主题/运行记录共用快照保留期，后验记录单独保留
    pub fn retention_windows(&self) -> RetentionWindows {
        RetentionWindows {
            snapshot_days: self.snapshot_retention_days,
            topic_days: self.snapshot_retention_days,
            context_run_days: self.snapshot_retention_days,
            outcome_days: self.outcome_retention_days,
        }
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        match self.timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!("无效时区配置 {}，回退为 UTC", self.timezone);
                chrono_tz::UTC
            }
        }
    }

    /// 配置时区下的当前时间（naive）
    pub fn now(&self) -> chrono::NaiveDateTime {
        chrono::Utc::now().with_timezone(&self.tz()).naive_local()
    }

    /// 配置时区下的今天
    pub fn today(&self) -> chrono::NaiveDate {
        self.now().date()
    }
}
