use core::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};

/// A cancellation token that expires on its own.
///
/// The token is a child of the parent passed to [`deadline`], so it is
/// cancelled by whichever comes first: the timer elapsing, the parent being
/// cancelled, or this value being dropped. Dropping also stops the timer task.
pub struct Deadline {
    token: CancellationToken,
    _guard: DropGuard,
}

impl Deadline {
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Derives a token from `parent` that is cancelled once `after` has elapsed.
///
/// Must be called from within a Tokio runtime.
pub fn deadline(parent: &CancellationToken, after: Duration) -> Deadline {
    let token = parent.child_token();

    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = timer.cancelled() => {}
            () = tokio::time::sleep(after) => {
                tracing::debug!(?after, "Deadline elapsed");
                timer.cancel();
            }
        }
    });

    Deadline {
        _guard: token.clone().drop_guard(),
        token,
    }
}
