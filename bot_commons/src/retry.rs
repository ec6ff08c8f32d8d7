use std::{future::Future, time::Duration};

use teloxide::{ApiError, RequestError};

/// Total attempts made by [`retry_on_server_error`], including the first one.
pub const MAX_ATTEMPTS: u32 = 3;
/// Delay before the second attempt.
pub const INITIAL_DELAY: Duration = Duration::from_secs(2);
/// Multiplier applied to the delay after every failed attempt.
pub const BACKOFF_FACTOR: u32 = 2;

/// Returns `true` for errors that are worth retrying: flood waits, network hiccups and
/// Telegram's own server errors. Anything else (no rights, message not found...) will
/// fail the same way again, so there's no point.
#[must_use]
pub fn is_transient(error: &RequestError) -> bool {
    match error {
        RequestError::RetryAfter(_) | RequestError::Network(_) | RequestError::Io(_) => true,
        RequestError::Api(ApiError::Unknown(text)) => looks_like_server_error(text),
        _ => false,
    }
}

fn looks_like_server_error(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    [
        "internal server error",
        "bad gateway",
        "gateway timeout",
        "service unavailable",
        "timeout",
    ]
    .iter()
    .any(|x| text.contains(x))
}

/// How long to sleep before the next attempt after this error.
fn wait_for(error: &RequestError, backoff: Duration) -> Duration {
    match error {
        RequestError::RetryAfter(seconds) => seconds.duration(),
        _ => backoff,
    }
}

/// Runs the request produced by `make_request`, retrying it with exponential backoff
/// while it fails with a [transient][is_transient] error.
///
/// `make_request` is called anew for every attempt, so it should produce an owned future,
/// for example by calling [`Request::send`] on a freshly built request:
///
/// ```ignore
/// retry_on_server_error("delete ping", || bot.delete_message(chat, id).send()).await?;
/// ```
///
/// The last error is returned if all attempts fail.
///
/// [`Request::send`]: teloxide::requests::Request::send
pub async fn retry_on_server_error<T, F, Fut>(
    operation_name: &str,
    mut make_request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut backoff = INITIAL_DELAY;
    let mut attempt = 1;

    loop {
        match make_request().await {
            Ok(x) => {
                if attempt > 1 {
                    log::debug!("Operation '{operation_name}' succeeded on attempt {attempt}.");
                }
                return Ok(x);
            }
            Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                let wait = wait_for(&e, backoff);
                log::warn!(
                    "Operation '{operation_name}' failed (attempt {attempt}/{MAX_ATTEMPTS}): {e}. Retrying in {:.2}s...",
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                backoff *= BACKOFF_FACTOR;
                attempt += 1;
            }
            Err(e) => {
                if is_transient(&e) {
                    log::error!(
                        "Operation '{operation_name}' failed after {MAX_ATTEMPTS} attempts: {e}"
                    );
                }
                return Err(e);
            }
        }
    }
}
