use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use tutoria_core::{BidCancellation, BiddingMirror, Notifier, Role};
use tutoria_shared::models::Notification;

/// Downstream calls made after a transition has committed.
///
/// Nothing here can fail a transition: notifications run in the background and
/// mirror errors are logged and dropped.
pub struct SideEffects {
    notifier: Arc<dyn Notifier>,
    mirror: Arc<dyn BiddingMirror>,
    in_flight: Mutex<JoinSet<()>>,
}

impl SideEffects {
    pub fn new(notifier: Arc<dyn Notifier>, mirror: Arc<dyn BiddingMirror>) -> Self {
        Self {
            notifier,
            mirror,
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// Fire and forget.
    pub async fn notify(&self, notification: Notification) {
        let notifier = self.notifier.clone();
        let mut in_flight = self.in_flight.lock().await;
        while in_flight.try_join_next().is_some() {}

        in_flight.spawn(async move {
            if let Err(e) = notifier.notify(&notification).await {
                warn!(
                    "Notification {:?} for class request {} not delivered: {}",
                    notification.event, notification.class_request_id, e
                );
            }
        });
    }

    /// Wait for every notification spawned so far.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.in_flight.lock().await);
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                warn!("Notification task aborted: {}", e);
            }
        }
    }

    pub async fn accept_bid(&self, bid_id: Option<&str>) {
        let Some(bid_id) = bid_id else {
            debug!("No bid to accept");
            return;
        };
        if let Err(e) = self.mirror.accept_bid(bid_id).await {
            warn!("Bidding mirror did not accept bid {}: {}", bid_id, e);
        }
    }

    pub async fn confirm_bid(&self, bid_id: Option<&str>) {
        let Some(bid_id) = bid_id else {
            debug!("No bid to confirm");
            return;
        };
        if let Err(e) = self.mirror.confirm_bid(bid_id).await {
            warn!("Bidding mirror did not confirm bid {}: {}", bid_id, e);
        }
    }

    pub async fn cancel_bid(&self, offer_id: &str, bid_id: Option<&str>, role: Role) {
        let Some(bid_id) = bid_id else {
            debug!("Offer {} has no bid to cancel", offer_id);
            return;
        };
        let cancellation = BidCancellation {
            offer_id: offer_id.to_string(),
            bid_id: bid_id.to_string(),
            role,
        };
        if let Err(e) = self.mirror.cancel_bid(&cancellation).await {
            warn!("Bidding mirror did not cancel bid {} of offer {}: {}", bid_id, offer_id, e);
        }
    }
}
