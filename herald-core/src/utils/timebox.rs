use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline, mapping an elapsed deadline to an ordinary error.
///
/// The timer lives inside [`tokio::time::timeout`] and is dropped on every
/// exit path, whether the call succeeds, fails or runs out of time.
pub async fn timebox<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_becomes_error() {
        let result: Result<(), String> = timebox(
            Duration::from_secs(1),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            |after| format!("timed out after {after:?}"),
        )
        .await;
        assert_eq!(result, Err("timed out after 1s".to_string()));
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let ok: Result<u8, String> =
            timebox(Duration::from_secs(1), async { Ok(7) }, |_| String::new()).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> =
            timebox(Duration::from_secs(1), async { Err("boom".into()) }, |_| String::new()).await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
