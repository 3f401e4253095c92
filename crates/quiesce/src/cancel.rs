//! Cancellation interop for async callers.

use tokio_util::sync::CancellationToken;

use crate::closer::Closer;

impl Closer {
    /// A cancellation token bound to this node's closing signal.
    ///
    /// The token is cancelled the moment teardown begins (when the closing
    /// signal fires, not when the node is fully closed), so async
    /// dependents can react as soon as shutdown starts. Requesting a token
    /// on a node that is already closing returns an already-cancelled
    /// token. Every call hands out a clone of the same token.
    pub fn cancellation_token(&self) -> CancellationToken {
        let token = self.cancellation_token_slot();
        // The close pass cancels the stored token right after firing the
        // closing signal; a token created after that read would be missed,
        // so cover the race here.
        if self.is_closing() {
            token.cancel();
        }
        token
    }
}
