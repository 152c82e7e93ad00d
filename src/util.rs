use std::{future::Future, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::time::timeout;

/// Wraps `tokio::time::timeout`, converting elapsed deadlines and inner errors into contextual
/// `anyhow::Error` values for consistent diagnostics.
pub async fn timeout_with_context<F, T, E>(
    duration: Duration,
    future: F,
    context: impl Into<String>,
) -> Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let context = context.into();
    timeout(duration, future)
        .await
        .map_err(|_| anyhow!("timed out {context}"))?
        .with_context(|| format!("failed while {context}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_reports_context() {
        let err = timeout_with_context(
            Duration::from_millis(10),
            std::future::pending::<std::io::Result<()>>(),
            "reading request body",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "timed out reading request body");
    }

    #[tokio::test]
    async fn inner_errors_gain_context() {
        let err = timeout_with_context(
            Duration::from_secs(1),
            async { Err::<(), _>(std::io::Error::other("reset")) },
            "writing response",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "failed while writing response");
    }
}
