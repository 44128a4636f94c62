use std::time::Duration;

use thiserror::Error;

use crate::dialogs::{DialogsApi, DialogsRequest, DialogsResponse};
use crate::remote::RemoteError;

pub const DEFAULT_FLOOD_WAIT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("still rate limited after {0} retries")]
    Exhausted(u32),
}

/// Fixed-interval retry on flood control.
///
/// With `max_retries: None` the request is retried for as long as the server
/// keeps answering with flood waits.
#[derive(Clone, Copy, Debug)]
pub struct FloodRetry {
    pub interval: Duration,
    pub max_retries: Option<u32>,
}

impl Default for FloodRetry {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FLOOD_WAIT,
            max_retries: None,
        }
    }
}

impl FloodRetry {
    /// Issues `request`, sleeping and re-issuing the identical request on every
    /// flood wait. Any other error is returned as is.
    pub async fn get_dialogs<D: DialogsApi + ?Sized>(
        &self,
        api: &mut D,
        request: &DialogsRequest,
    ) -> Result<DialogsResponse, RetryError> {
        let mut retries = 0u32;
        loop {
            match api.get_dialogs(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_flood_wait() => {
                    if self.max_retries.is_some_and(|max| retries >= max) {
                        return Err(RetryError::Exhausted(retries));
                    }
                    retries += 1;
                    tracing::warn!(
                        error = %err,
                        sleep_secs = self.interval.as_secs(),
                        attempt = retries,
                        "flood wait, retrying getDialogs"
                    );
                    tokio::time::sleep(self.interval).await;
                }
                Err(err) => return Err(RetryError::Remote(err)),
            }
        }
    }
}
