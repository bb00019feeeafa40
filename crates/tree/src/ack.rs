//! Completion tokens for follow-up work
//!
//! A blocking structural call hands an [`AckToken`] to the parent actor.
//! Every follow-up message the parent sends carries a clone, and forwards
//! it again if it fans out further. The caller's [`AckBarrier`] resolves
//! once the last clone is dropped, i.e. when all follow-up work has been
//! processed or discarded by a dead recipient.

use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub(crate) struct AckToken {
    // Never sent on; dropping the last clone closes the channel
    _release: Arc<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub(crate) struct AckBarrier {
    released: oneshot::Receiver<()>,
}

pub(crate) fn barrier() -> (AckToken, AckBarrier) {
    let (tx, rx) = oneshot::channel();
    (
        AckToken {
            _release: Arc::new(tx),
        },
        AckBarrier { released: rx },
    )
}

impl AckBarrier {
    /// Wait until every token clone has been dropped
    pub(crate) async fn wait(self) {
        let _ = self.released.await;
    }
}
