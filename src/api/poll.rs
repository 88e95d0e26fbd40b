use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::error::ApiError;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Polling configuration for long-running backend tasks.
#[derive(Clone, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_polls: 60,
        }
    }
}

/// Outcome of one probe. `Pending` carries whatever progress the probe saw.
pub enum PollStep<T, S = ()> {
    Done(T),
    Pending(S),
}

/// Probe immediately, then once per interval, until the probe reports
/// `Done` or `max_polls` probes have been made (`Ok(None)`). Probe errors end
/// polling at once. `on_pending` receives the attempt number and progress of
/// every pending probe.
pub async fn poll_until<F, Fut, T, S, P>(
    config: &PollConfig,
    operation_name: &str,
    mut probe: F,
    mut on_pending: P,
) -> Result<Option<T>, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollStep<T, S>, ApiError>>,
    P: FnMut(u32, S),
{
    for attempt in 1..=config.max_polls {
        match probe(attempt).await? {
            PollStep::Done(value) => return Ok(Some(value)),
            PollStep::Pending(progress) => {
                on_pending(attempt, progress);
                if attempt < config.max_polls {
                    log(
                        Level::Trace,
                        Domain::Api,
                        "poll_pending",
                        obj(&[
                            ("operation", v_str(operation_name)),
                            ("attempt", serde_json::json!(attempt)),
                        ]),
                    );
                    sleep(config.interval).await;
                }
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_polls: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(1),
            max_polls,
        }
    }

    #[tokio::test]
    async fn test_done_on_first_probe() {
        let result = poll_until(
            &fast(3),
            "test",
            |_| async { Ok(PollStep::<_, ()>::Done(42)) },
            |_, _| {},
        )
        .await;
        assert_eq!(result.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_eventual_completion() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let mut seen = Vec::new();
        let result = poll_until(
            &fast(5),
            "test",
            move |_| {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Ok(PollStep::Pending(n))
                    } else {
                        Ok(PollStep::Done("ok"))
                    }
                }
            },
            |attempt, n| seen.push((attempt, n)),
        )
        .await;
        assert_eq!(result.unwrap(), Some("ok"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(seen, vec![(1, 0), (2, 1)]);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result: Result<Option<()>, ApiError> = poll_until(
            &fast(4),
            "test",
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(PollStep::Pending(())) }
            },
            |_, _| {},
        )
        .await;
        assert!(result.unwrap().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_error_stops_polling() {
        let result: Result<Option<()>, ApiError> = poll_until(
            &fast(4),
            "test",
            |_| async { Err::<PollStep<(), ()>, _>(ApiError::Backend("gone".into())) },
            |_, _| {},
        )
        .await;
        assert!(matches!(result, Err(ApiError::Backend(_))));
    }
}
