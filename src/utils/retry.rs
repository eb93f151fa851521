use anyhow::Result;
use std::time::Duration;
use tokio::time::sleep;

/// 指数退避重试。
/// 仅对可重试错误（超时、5xx、连接错误）重试，其余错误直接返回。
///
/// # Arguments
/// * `label` - 日志中标识本次请求
/// * `max_retries` - 最大重试次数（不含首次，总共最多执行 max_retries + 1 次）
/// * `operation` - 异步操作闭包
pub async fn retry_with_backoff<F, Fut, T>(
    label: &str,
    max_retries: u32,
    operation: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == max_retries {
                    return Err(e);
                }

                // 1s, 2s, 4s ...
                let delay = Duration::from_secs(1 << attempt);
                log::warn!(
                    "{} 请求失败（第 {} 次），{}s 后重试: {}",
                    label,
                    attempt + 1,
                    delay.as_secs(),
                    e
                );
                last_err = Some(e);
                sleep(delay).await;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("retry exhausted")))
}

fn is_retryable(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_lowercase();
    ["timeout", "timed out", "connection", "500", "502", "503", "504", "server error", "broken pipe", "reset by peer"]
        .iter()
        .any(|k| msg.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff("kline", 3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff("kline", 3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("404 not found")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
