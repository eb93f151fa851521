use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::models::news::Sentiment;
use crate::models::prediction::{AgentPredictionOutcome, NewPrediction, OutcomeFilter, OutcomeStatus};
use crate::models::settings::ContextSettings;
use crate::models::snapshot::{
    AgentContextRun, AnalysisRecord, CleanupStats, NewTopicSnapshot, NewsTopicSnapshot,
    StockContextSnapshot,
};

const SETTINGS_ID: &str = "context";

pub struct Database {
    conn: Mutex<Connection>,
}

/// 各表清理截止日期（YYYY-MM-DD，删除严格早于该日期的行）
#[derive(Debug, Clone)]
pub struct CleanupCutoffs {
    pub snapshot: String,
    pub topic: String,
    pub context_run: String,
    pub outcome: String,
}

impl Database {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("stock_context.db");
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        log::debug!("SQLite journal_mode={}", mode);
        Self::from_connection(conn)
    }

    /// 内存库，测试和临时扫描使用
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("数据库连接锁已损坏"))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS settings (
                id TEXT PRIMARY KEY DEFAULT 'default',
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS stock_context_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                market TEXT NOT NULL,
                snapshot_date TEXT NOT NULL,
                context_type TEXT NOT NULL,
                payload TEXT NOT NULL DEFAULT '{}',
                quality TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (symbol, market, snapshot_date, context_type)
            );

            CREATE INDEX IF NOT EXISTS idx_stock_context_symbol_date
                ON stock_context_snapshots(symbol, market, snapshot_date);

            CREATE TABLE IF NOT EXISTS news_topic_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                snapshot_date TEXT NOT NULL,
                window_days INTEGER NOT NULL DEFAULT 7,
                symbols TEXT NOT NULL DEFAULT '[]',
                summary TEXT NOT NULL DEFAULT '',
                topics TEXT NOT NULL DEFAULT '[]',
                sentiment TEXT NOT NULL DEFAULT 'neutral',
                coverage TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (snapshot_date, window_days)
            );

            CREATE INDEX IF NOT EXISTS idx_news_topic_date ON news_topic_snapshots(snapshot_date);

            CREATE TABLE IF NOT EXISTS agent_context_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                stock_symbol TEXT NOT NULL DEFAULT '*',
                analysis_date TEXT NOT NULL,
                context_payload TEXT NOT NULL DEFAULT '{}',
                quality TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_context_run_agent_date ON agent_context_runs(agent_name, analysis_date);
            CREATE INDEX IF NOT EXISTS idx_context_run_stock_date ON agent_context_runs(stock_symbol, analysis_date);

            CREATE TABLE IF NOT EXISTS agent_prediction_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                stock_symbol TEXT NOT NULL,
                stock_market TEXT NOT NULL DEFAULT 'CN',
                prediction_date TEXT NOT NULL,
                horizon_days INTEGER NOT NULL DEFAULT 1,
                action TEXT NOT NULL DEFAULT 'watch',
                action_label TEXT NOT NULL DEFAULT '观望',
                confidence REAL,
                trigger_price REAL,
                outcome_price REAL,
                outcome_return_pct REAL,
                outcome_status TEXT NOT NULL DEFAULT 'pending',
                meta TEXT NOT NULL DEFAULT '{}',
                evaluated_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_prediction_agent_stock_date
                ON agent_prediction_outcomes(agent_name, stock_symbol, prediction_date);
            CREATE INDEX IF NOT EXISTS idx_prediction_status_horizon
                ON agent_prediction_outcomes(outcome_status, horizon_days);

            CREATE TABLE IF NOT EXISTS analysis_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_name TEXT NOT NULL,
                stock_symbol TEXT NOT NULL DEFAULT '*',
                analysis_date TEXT NOT NULL,
                raw_data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_analysis_agent_date ON analysis_history(agent_name, analysis_date);
            ",
        )?;
        Ok(())
    }

    // ====== Settings ======

    pub fn save_settings(&self, settings: &ContextSettings) -> Result<()> {
        let conn = self.conn()?;
        let data = serde_json::to_string(settings)?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (id, data, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![SETTINGS_ID, data],
        )?;
        Ok(())
    }

    pub fn load_settings(&self) -> Result<ContextSettings> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT data FROM settings WHERE id = ?1",
            params![SETTINGS_ID],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let default = ContextSettings::default();
                drop(conn);
                self.save_settings(&default)?;
                Ok(default)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ====== Stock Context Snapshots ======

    /// 按 (symbol, market, snapshot_date, context_type) 幂等写入
    pub fn upsert_stock_context_snapshot(
        &self,
        symbol: &str,
        market: &str,
        snapshot_date: &str,
        context_type: &str,
        payload: &Value,
        quality: &Value,
    ) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stock_context_snapshots (symbol, market, snapshot_date, context_type, payload, quality)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(symbol, market, snapshot_date, context_type)
             DO UPDATE SET payload = excluded.payload, quality = excluded.quality, updated_at = datetime('now')",
            params![
                symbol,
                market,
                snapshot_date,
                context_type,
                payload.to_string(),
                quality.to_string()
            ],
        )?;
        Ok(())
    }

    pub fn get_recent_stock_context_snapshots(
        &self,
        symbol: &str,
        market: &str,
        context_type: Option<&str>,
        cutoff: &str,
        limit: usize,
    ) -> Result<Vec<StockContextSnapshot>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, symbol, market, snapshot_date, context_type, payload, quality, created_at, updated_at
             FROM stock_context_snapshots
             WHERE symbol = ?1 AND market = ?2 AND snapshot_date >= ?3
               AND (?4 IS NULL OR context_type = ?4)
             ORDER BY snapshot_date DESC, id DESC
             LIMIT ?5",
        )?;
        let rows = stmt.query_map(
            params![symbol, market, cutoff, context_type, limit as i64],
            map_snapshot,
        )?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn count_stock_context_snapshots(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM stock_context_snapshots", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // ====== News Topic Snapshots ======

    pub fn upsert_news_topic_snapshot(&self, topic: &NewTopicSnapshot) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO news_topic_snapshots (snapshot_date, window_days, symbols, summary, topics, sentiment, coverage)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(snapshot_date, window_days)
             DO UPDATE SET symbols = excluded.symbols, summary = excluded.summary, topics = excluded.topics,
                           sentiment = excluded.sentiment, coverage = excluded.coverage",
            params![
                topic.snapshot_date,
                topic.window_days,
                serde_json::to_string(&topic.symbols)?,
                topic.summary,
                serde_json::to_string(&topic.topics)?,
                topic.sentiment.as_str(),
                topic.coverage.to_string()
            ],
        )?;
        Ok(())
    }

    pub fn get_latest_news_topic_snapshot(&self, window_days: i64) -> Result<Option<NewsTopicSnapshot>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT id, snapshot_date, window_days, symbols, summary, topics, sentiment, coverage, created_at
                 FROM news_topic_snapshots WHERE window_days = ?1
                 ORDER BY snapshot_date DESC LIMIT 1",
                params![window_days],
                |row| {
                    Ok(NewsTopicSnapshot {
                        id: row.get(0)?,
                        snapshot_date: row.get(1)?,
                        window_days: row.get(2)?,
                        symbols: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
                        summary: row.get(4)?,
                        topics: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
                        sentiment: Sentiment::parse(&row.get::<_, String>(6)?),
                        coverage: json_column(row, 7)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    // ====== Agent Context Runs ======

    pub fn insert_agent_context_run(
        &self,
        agent_name: &str,
        stock_symbol: &str,
        analysis_date: &str,
        context_payload: &Value,
        quality: &Value,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agent_context_runs (agent_name, stock_symbol, analysis_date, context_payload, quality)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent_name,
                stock_symbol,
                analysis_date,
                context_payload.to_string(),
                quality.to_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_recent_agent_context_runs(
        &self,
        agent_name: Option<&str>,
        stock_symbol: Option<&str>,
        cutoff: &str,
        limit: usize,
    ) -> Result<Vec<AgentContextRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, agent_name, stock_symbol, analysis_date, context_payload, quality, created_at
             FROM agent_context_runs
             WHERE analysis_date >= ?1
               AND (?2 IS NULL OR agent_name = ?2)
               AND (?3 IS NULL OR stock_symbol = ?3)
             ORDER BY created_at DESC, id DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![cutoff, agent_name, stock_symbol, limit as i64], |row| {
            Ok(AgentContextRun {
                id: row.get(0)?,
                agent_name: row.get(1)?,
                stock_symbol: row.get(2)?,
                analysis_date: row.get(3)?,
                context_payload: json_column(row, 4)?,
                quality: json_column(row, 5)?,
                created_at: row.get(6)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ====== Prediction Outcomes ======

    pub fn insert_prediction_outcome(&self, p: &NewPrediction, meta: &Value) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO agent_prediction_outcomes
                (agent_name, stock_symbol, stock_market, prediction_date, horizon_days, action, action_label,
                 confidence, trigger_price, outcome_status, meta)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)",
            params![
                p.agent_name,
                p.stock_symbol,
                p.stock_market,
                p.prediction_date,
                p.horizon_days.max(1),
                p.action,
                p.action_label,
                p.confidence,
                p.trigger_price,
                meta.to_string()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 仅当记录仍为 pending 时写入终态，返回是否实际更新
    pub fn mark_prediction_outcome(
        &self,
        id: i64,
        outcome_price: Option<f64>,
        outcome_return_pct: Option<f64>,
        status: OutcomeStatus,
        evaluated_at: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE agent_prediction_outcomes
             SET outcome_price = ?2, outcome_return_pct = ?3, outcome_status = ?4, evaluated_at = ?5
             WHERE id = ?1 AND outcome_status = 'pending'",
            params![id, outcome_price, outcome_return_pct, status.as_str(), evaluated_at],
        )?;
        Ok(changed == 1)
    }

    pub fn list_pending_prediction_outcomes(
        &self,
        today: &str,
        max_horizon_days: i64,
        limit: usize,
    ) -> Result<Vec<AgentPredictionOutcome>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agent_prediction_outcomes
             WHERE outcome_status = 'pending' AND horizon_days <= ?1 AND prediction_date <= ?2
             ORDER BY prediction_date ASC, created_at ASC, id ASC
             LIMIT ?3",
            OUTCOME_COLUMNS
        ))?;
        let rows = stmt.query_map(params![max_horizon_days, today, limit as i64], map_outcome)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn list_prediction_outcomes(&self, filter: &OutcomeFilter, cutoff: &str) -> Result<Vec<AgentPredictionOutcome>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM agent_prediction_outcomes
             WHERE prediction_date >= ?1
               AND (?2 IS NULL OR agent_name = ?2)
               AND (?3 IS NULL OR stock_symbol = ?3)
               AND (?4 IS NULL OR outcome_status = ?4)
             ORDER BY prediction_date DESC, created_at DESC, id DESC
             LIMIT ?5",
            OUTCOME_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                cutoff,
                filter.agent_name,
                filter.stock_symbol,
                filter.status.map(|s| s.as_str()),
                filter.limit as i64
            ],
            map_outcome,
        )?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn get_prediction_outcome(&self, id: i64) -> Result<Option<AgentPredictionOutcome>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("SELECT {} FROM agent_prediction_outcomes WHERE id = ?1", OUTCOME_COLUMNS),
                params![id],
                map_outcome,
            )
            .optional()?;
        Ok(result)
    }

    // ====== Analysis History ======

    pub fn save_analysis_record(
        &self,
        agent_name: &str,
        stock_symbol: &str,
        analysis_date: &str,
        raw_data: &Value,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analysis_history (agent_name, stock_symbol, analysis_date, raw_data) VALUES (?1, ?2, ?3, ?4)",
            params![agent_name, stock_symbol, analysis_date, raw_data.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_analysis_records(
        &self,
        agent_names: &[&str],
        cutoff: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>> {
        let conn = self.conn()?;
        let agents = serde_json::to_string(agent_names)?;
        let mut stmt = conn.prepare(
            "SELECT id, agent_name, stock_symbol, analysis_date, raw_data, created_at
             FROM analysis_history
             WHERE agent_name IN (SELECT value FROM json_each(?1)) AND analysis_date >= ?2
             ORDER BY analysis_date DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![agents, cutoff, limit as i64], |row| {
            Ok(AnalysisRecord {
                id: row.get(0)?,
                agent_name: row.get(1)?,
                stock_symbol: row.get(2)?,
                analysis_date: row.get(3)?,
                raw_data: json_column(row, 4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    // ====== Retention ======

    /// 单事务内按各表截止日期删除过期数据
    pub fn cleanup_context_data(&self, cutoffs: &CleanupCutoffs) -> Result<CleanupStats> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let stats = CleanupStats {
            stock_context_snapshots: tx.execute(
                "DELETE FROM stock_context_snapshots WHERE snapshot_date < ?1",
                params![cutoffs.snapshot],
            )?,
            news_topic_snapshots: tx.execute(
                "DELETE FROM news_topic_snapshots WHERE snapshot_date < ?1",
                params![cutoffs.topic],
            )?,
            agent_context_runs: tx.execute(
                "DELETE FROM agent_context_runs WHERE analysis_date < ?1",
                params![cutoffs.context_run],
            )?,
            agent_prediction_outcomes: tx.execute(
                "DELETE FROM agent_prediction_outcomes WHERE prediction_date < ?1",
                params![cutoffs.outcome],
            )?,
        };
        tx.commit()?;
        Ok(stats)
    }
}

const OUTCOME_COLUMNS: &str = "id, agent_name, stock_symbol, stock_market, prediction_date, horizon_days, action, action_label, \
     confidence, trigger_price, outcome_price, outcome_return_pct, outcome_status, meta, evaluated_at, created_at";

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let text: Option<String> = row.get(idx)?;
    Ok(text
        .and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or(Value::Null))
}

fn map_snapshot(row: &Row<'_>) -> rusqlite::Result<StockContextSnapshot> {
    Ok(StockContextSnapshot {
        id: row.get(0)?,
        symbol: row.get(1)?,
        market: row.get(2)?,
        snapshot_date: row.get(3)?,
        context_type: row.get(4)?,
        payload: json_column(row, 5)?,
        quality: json_column(row, 6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_outcome(row: &Row<'_>) -> rusqlite::Result<AgentPredictionOutcome> {
    let status: String = row.get(12)?;
    let outcome_status = OutcomeStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            12,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("未知的 outcome_status: {}", status),
            )),
        )
    })?;
    Ok(AgentPredictionOutcome {
        id: row.get(0)?,
        agent_name: row.get(1)?,
        stock_symbol: row.get(2)?,
        stock_market: row.get(3)?,
        prediction_date: row.get(4)?,
        horizon_days: row.get(5)?,
        action: row.get(6)?,
        action_label: row.get(7)?,
        confidence: row.get(8)?,
        trigger_price: row.get(9)?,
        outcome_price: row.get(10)?,
        outcome_return_pct: row.get(11)?,
        outcome_status,
        meta: json_column(row, 13)?,
        evaluated_at: row.get(14)?,
        created_at: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_upsert_overwrites_in_place() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_stock_context_snapshot("600519", "CN", "2024-03-01", "daily_report", &json!({"v": 1}), &json!({"score": 50}))
            .unwrap();
        db.upsert_stock_context_snapshot("600519", "CN", "2024-03-01", "daily_report", &json!({"v": 2}), &json!({"score": 80}))
            .unwrap();
        assert_eq!(db.count_stock_context_snapshots().unwrap(), 1);
        let rows = db
            .get_recent_stock_context_snapshots("600519", "CN", Some("daily_report"), "2024-01-01", 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload, json!({"v": 2}));
        assert_eq!(rows[0].quality_score(), Some(80));
    }

    #[test]
    fn test_mark_outcome_only_once() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_prediction_outcome(
                &NewPrediction {
                    agent_name: "daily_report".into(),
                    stock_symbol: "600519".into(),
                    stock_market: "CN".into(),
                    prediction_date: "2024-01-01".into(),
                    horizon_days: 1,
                    action: "buy".into(),
                    action_label: "买入".into(),
                    confidence: None,
                    trigger_price: Some(10.0),
                    meta: Value::Null,
                },
                &json!({}),
            )
            .unwrap();
        assert!(db
            .mark_prediction_outcome(id, Some(11.0), Some(10.0), OutcomeStatus::Evaluated, "2024-01-02 15:00:00")
            .unwrap());
        assert!(!db
            .mark_prediction_outcome(id, Some(12.0), Some(20.0), OutcomeStatus::Evaluated, "2024-01-03 15:00:00")
            .unwrap());
        let rec = db.get_prediction_outcome(id).unwrap().unwrap();
        assert_eq!(rec.outcome_price, Some(11.0));
        assert_eq!(rec.outcome_status, OutcomeStatus::Evaluated);
    }

    #[test]
    fn test_load_settings_creates_default_row() {
        let db = Database::open_in_memory().unwrap();
        let s = db.load_settings().unwrap();
        assert_eq!(s, ContextSettings::default());
        let mut changed = s.clone();
        changed.eval_interval_hours = 3;
        db.save_settings(&changed).unwrap();
        assert_eq!(db.load_settings().unwrap().eval_interval_hours, 3);
    }

    #[test]
    fn test_analysis_records_filter_by_agent() {
        let db = Database::open_in_memory().unwrap();
        db.save_analysis_record("news_digest", "*", "2024-03-01", &json!({"news": []})).unwrap();
        db.save_analysis_record("chat", "*", "2024-03-01", &json!({})).unwrap();
        let rows = db
            .list_analysis_records(&["news_digest", "daily_report"], "2024-02-01", 30)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].agent_name, "news_digest");
    }
}
