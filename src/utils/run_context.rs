use chrono::NaiveDateTime;

/// 一次 Agent 运行的显式上下文，沿调用链传递用于日志关联
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub trace_id: String,
    pub run_id: String,
    pub agent_name: String,
    /// schedule / manual / api
    pub trigger_source: String,
    /// 运行基准时间（配置时区下的 naive 时间），新闻窗口与快照日期都以它为准
    pub started_at: NaiveDateTime,
}

impl RunContext {
    pub fn new(agent_name: &str, trigger_source: &str, started_at: NaiveDateTime) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            trace_id: run_id[..16].to_string(),
            run_id,
            agent_name: agent_name.to_string(),
            trigger_source: trigger_source.to_string(),
            started_at,
        }
    }

    /// 指定 trace id（上游已分配时）
    pub fn with_trace_id(mut self, trace_id: &str) -> Self {
        self.trace_id = trace_id.to_string();
        self
    }

    pub fn snapshot_date(&self) -> String {
        self.started_at.format("%Y-%m-%d").to_string()
    }

    pub fn log_prefix(&self) -> String {
        format!(
            "[{} trace={} run={}]",
            self.agent_name, self.trace_id, self.run_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_date_and_prefix() {
        let at = NaiveDateTime::parse_from_str("2024-03-05 09:31:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let ctx = RunContext::new("premarket_outlook", "manual", at).with_trace_id("abc");
        assert_eq!(ctx.snapshot_date(), "2024-03-05");
        assert!(ctx.log_prefix().starts_with("[premarket_outlook trace=abc run="));
        assert_eq!(ctx.run_id.len(), 32);
    }
}
