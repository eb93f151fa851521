pub mod models;
pub mod services;
pub mod commands;
pub mod db;
pub mod utils;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use db::database::Database;
use models::settings::ContextSettings;
use services::context_builder::ContextBuilder;
use services::context_store::ContextStore;
use services::history_kline::{DailyBarSource, HistoryKlineService};
use services::prediction_outcome::PredictionEvaluator;
use services::scheduler::MaintenanceScheduler;

const DATA_DIR_ENV: &str = "STOCK_CONTEXT_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "./data";

pub struct AppState {
    pub db: Arc<Database>,
    pub store: ContextStore,
    pub settings: ContextSettings,
    pub builder: ContextBuilder,
    pub evaluator: Arc<PredictionEvaluator>,
    pub scheduler: Arc<MaintenanceScheduler>,
}

impl AppState {
    /// 读取（或初始化）配置并组装各服务
    pub fn new(db: Arc<Database>, bars: Arc<dyn DailyBarSource>) -> Result<Self> {
        let settings = db.load_settings()?.normalized();
        let store = ContextStore::new(Arc::clone(&db));
        let builder = ContextBuilder::new(store.clone(), Arc::clone(&bars));
        let evaluator = Arc::new(PredictionEvaluator::new(store.clone(), bars));
        let scheduler = Arc::new(MaintenanceScheduler::new(
            Arc::clone(&evaluator),
            store.clone(),
            settings.clone(),
        ));
        Ok(Self {
            db,
            store,
            settings,
            builder,
            evaluator,
            scheduler,
        })
    }
}

pub fn data_dir_from_env() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// 启动维护守护进程，直到收到 Ctrl-C
pub async fn run() -> Result<()> {
    let data_dir = data_dir_from_env();
    log::info!("数据目录: {}", data_dir.display());

    let database = Arc::new(Database::new(data_dir)?);
    let bars: Arc<dyn DailyBarSource> = Arc::new(HistoryKlineService::new()?);
    let state = AppState::new(database, bars)?;

    let handle = Arc::clone(&state.scheduler).start();

    tokio::signal::ctrl_c().await?;
    log::info!("收到退出信号");
    handle.shutdown();
    Ok(())
}
