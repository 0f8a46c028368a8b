use std::{future::Future, time::Duration};

use crate::error::OperatorError;

/// Runs a single delegate invocation, applying `timeout` if set.
///
/// Shared by [`crate::ordered`] and [`crate::unordered`] so both
/// operators treat a delegate's `Err(String)` and a timeout the
/// same way.
pub(crate) async fn run_delegate<U, Fut>(
    fut: Fut,
    timeout: Option<Duration>,
) -> Result<U, OperatorError>
where
    Fut: Future<Output = Result<U, String>>,
{
    match timeout {
        Some(duration) => match tokio::time::timeout(duration, fut).await {
            Ok(result) => result.map_err(|message| OperatorError::Delegate { message }),
            Err(_) => Err(OperatorError::Timeout),
        },
        None => fut.await.map_err(|message| OperatorError::Delegate { message }),
    }
}
