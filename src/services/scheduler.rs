use chrono::{NaiveTime, Timelike, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::models::prediction::EvaluationStats;
use crate::models::settings::ContextSettings;
use crate::models::snapshot::CleanupStats;
use crate::services::context_store::ContextStore;
use crate::services::prediction_outcome::PredictionEvaluator;

const SECS_PER_DAY: u64 = 24 * 3600;
/// 评估间隔上限 30 天
const MAX_EVAL_INTERVAL_HOURS: u64 = 24 * 30;

/// 评估定时器周期，小时数收敛到 [1, 720]
pub fn eval_period(hours: u64) -> Duration {
    Duration::from_secs(hours.clamp(1, MAX_EVAL_INTERVAL_HOURS).saturating_mul(3600))
}

/// 距离下一次 hour:minute 的时长（now 为配置时区下的当前时间）。
/// 恰好等于目标时刻时返回一整天
pub fn duration_until_daily(hour: u32, minute: u32, now: NaiveTime) -> Duration {
    let target = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0).unwrap_or_default();
    let now_secs = now.num_seconds_from_midnight() as u64;
    let target_secs = target.num_seconds_from_midnight() as u64;
    let secs = if now_secs < target_secs {
        target_secs - now_secs
    } else {
        SECS_PER_DAY - now_secs + target_secs
    };
    Duration::from_secs(secs)
}

/// 单飞标记的持有者，析构时释放
struct JobGuard<'a>(&'a AtomicBool);

impl<'a> JobGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobGuard(flag))
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 后台维护任务：定时评估建议后验 + 每日清理过期上下文数据
pub struct MaintenanceScheduler {
    evaluator: Arc<PredictionEvaluator>,
    store: ContextStore,
    settings: ContextSettings,
    evaluating: AtomicBool,
    cleaning: AtomicBool,
}

/// 已启动的定时器句柄
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub fn shutdown(self) {
        for task in self.tasks {
            task.abort();
        }
        log::info!("维护任务已停止");
    }
}

impl MaintenanceScheduler {
    pub fn new(evaluator: Arc<PredictionEvaluator>, store: ContextStore, settings: ContextSettings) -> Self {
        Self {
            evaluator,
            store,
            settings: settings.normalized(),
            evaluating: AtomicBool::new(false),
            cleaning: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn is_evaluating(&self) -> bool {
        self.evaluating.load(Ordering::Acquire)
    }

    pub fn is_cleaning(&self) -> bool {
        self.cleaning.load(Ordering::Acquire)
    }

    /// 按配置执行一次后验评估（不经过单飞标记）
    pub async fn evaluate_once(&self) -> EvaluationStats {
        self.evaluator
            .evaluate_pending(
                self.settings.now(),
                self.settings.eval_max_horizon_days,
                self.settings.eval_limit,
            )
            .await
    }

    /// 按配置执行一次过期清理（不经过单飞标记）
    pub fn cleanup_once(&self) -> CleanupStats {
        let stats = self
            .store
            .cleanup_context_data(&self.settings.retention_windows(), self.settings.today());
        log::info!(
            "上下文数据清理完成: snapshots={} topics={} runs={} outcomes={}",
            stats.stock_context_snapshots,
            stats.news_topic_snapshots,
            stats.agent_context_runs,
            stats.agent_prediction_outcomes
        );
        stats
    }

    /// 定时评估任务。上一次仍在执行时跳过；任务体 panic 只记录日志
    pub async fn evaluate_job(self: &Arc<Self>) -> Option<EvaluationStats> {
        let Some(_guard) = JobGuard::try_acquire(&self.evaluating) else {
            log::info!("建议后验评估仍在执行，跳过本次触发");
            return None;
        };
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.evaluate_once().await }).await {
            Ok(stats) => Some(stats),
            Err(e) if e.is_panic() => {
                log::error!("建议后验评估任务异常退出: {}", e);
                None
            }
            Err(e) => {
                log::error!("建议后验评估任务被取消: {}", e);
                None
            }
        }
    }

    /// 每日清理任务，单飞规则同评估任务
    pub async fn cleanup_job(self: &Arc<Self>) -> Option<CleanupStats> {
        let Some(_guard) = JobGuard::try_acquire(&self.cleaning) else {
            log::info!("上下文数据清理仍在执行，跳过本次触发");
            return None;
        };
        let this = Arc::clone(self);
        match tokio::task::spawn_blocking(move || this.cleanup_once()).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                log::error!("上下文数据清理任务异常退出: {}", e);
                None
            }
        }
    }

    /// 启动两个独立定时器。每次触发都单独 spawn 任务体，互不阻塞
    pub fn start(self: Arc<Self>) -> MaintenanceHandle {
        let period = eval_period(self.settings.eval_interval_hours);
        log::info!(
            "维护任务启动: 每 {} 小时评估建议后验, 每日 {:02}:{:02} ({}) 清理过期数据",
            self.settings.eval_interval_hours,
            self.settings.cleanup_hour,
            self.settings.cleanup_minute,
            self.settings.timezone
        );

        let eval_self = Arc::clone(&self);
        let eval_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let job = Arc::clone(&eval_self);
                tokio::spawn(async move {
                    job.evaluate_job().await;
                });
            }
        });

        let cleanup_self = self;
        let cleanup_task = tokio::spawn(async move {
            let tz = cleanup_self.settings.tz();
            loop {
                let now = Utc::now().with_timezone(&tz).time();
                let wait = duration_until_daily(
                    cleanup_self.settings.cleanup_hour,
                    cleanup_self.settings.cleanup_minute,
                    now,
                );
                log::info!(
                    "下次数据清理在 {} 小时 {} 分钟后",
                    wait.as_secs() / 3600,
                    (wait.as_secs() % 3600) / 60
                );
                tokio::time::sleep(wait).await;
                let job = Arc::clone(&cleanup_self);
                tokio::spawn(async move {
                    job.cleanup_job().await;
                });
            }
        });

        MaintenanceHandle {
            tasks: vec![eval_task, cleanup_task],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::database::Database;
    use crate::models::prediction::NewPrediction;
    use crate::models::watchlist::{KlineItem, Market};
    use crate::services::history_kline::DailyBarSource;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct PanicBars;

    #[async_trait]
    impl DailyBarSource for PanicBars {
        async fn daily_bars(&self, _symbol: &str, _market: Market, _days: usize) -> Result<Vec<KlineItem>> {
            panic!("行情源崩溃");
        }
    }

    struct NoBars;

    #[async_trait]
    impl DailyBarSource for NoBars {
        async fn daily_bars(&self, _symbol: &str, _market: Market, _days: usize) -> Result<Vec<KlineItem>> {
            Ok(Vec::new())
        }
    }

    fn scheduler(bars: Arc<dyn DailyBarSource>) -> Arc<MaintenanceScheduler> {
        let store = ContextStore::new(Arc::new(Database::open_in_memory().unwrap()));
        let evaluator = Arc::new(PredictionEvaluator::new(store.clone(), bars));
        Arc::new(MaintenanceScheduler::new(evaluator, store, ContextSettings::default()))
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_duration_until_daily() {
        assert_eq!(duration_until_daily(4, 15, hm(3, 0)), Duration::from_secs(75 * 60));
        assert_eq!(duration_until_daily(4, 15, hm(5, 0)), Duration::from_secs((23 * 60 + 15) * 60));
        assert_eq!(duration_until_daily(4, 15, hm(4, 15)), Duration::from_secs(SECS_PER_DAY));
    }

    #[test]
    fn test_eval_period_is_bounded() {
        assert_eq!(eval_period(6), Duration::from_secs(6 * 3600));
        assert_eq!(eval_period(0), Duration::from_secs(3600));
        assert_eq!(eval_period(u64::MAX), Duration::from_secs(720 * 3600));
    }

    #[test]
    fn test_guard_is_released_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _g = JobGuard::try_acquire(&flag).unwrap();
            assert!(JobGuard::try_acquire(&flag).is_none());
        }
        assert!(JobGuard::try_acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_overlapping_evaluate_is_skipped() {
        let s = scheduler(Arc::new(NoBars));
        s.evaluating.store(true, Ordering::Release);
        assert!(s.evaluate_job().await.is_none());
        // 不同任务互不影响
        assert!(s.cleanup_job().await.is_some());

        s.evaluating.store(false, Ordering::Release);
        let stats = s.evaluate_job().await.unwrap();
        assert_eq!(stats.total_pending, 0);
        assert!(!s.is_evaluating());
    }

    #[tokio::test]
    async fn test_panicking_job_releases_guard() {
        let s = scheduler(Arc::new(PanicBars));
        s.evaluator
            .record_prediction(&NewPrediction {
                agent_name: "daily_report".into(),
                stock_symbol: "600519".into(),
                stock_market: "CN".into(),
                prediction_date: "2020-01-02".into(),
                horizon_days: 1,
                action: "buy".into(),
                action_label: "买入".into(),
                confidence: None,
                trigger_price: Some(10.0),
                meta: json!({}),
            })
            .unwrap();

        assert!(s.evaluate_job().await.is_none());
        assert!(!s.is_evaluating());
    }

    #[tokio::test]
    async fn test_cleanup_job_reports_counts() {
        let s = scheduler(Arc::new(NoBars));
        s.store.save_stock_context_snapshot(
            "600519",
            Market::CN,
            "2000-01-01",
            "daily_report",
            &json!({}),
            &json!({"score": 10}),
        );
        let stats = s.cleanup_job().await.unwrap();
        assert_eq!(stats.stock_context_snapshots, 1);
        assert!(!s.is_cleaning());
    }
}
