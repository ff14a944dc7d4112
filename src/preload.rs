//! Opportunistic low-priority prefetch of head-of-queue content
//! (SPEC_FULL §C.4), triggered after every successful `next_tx`.

use crate::model::ContentRequest;
use crate::wayfinder::Wayfinder;
use std::sync::Arc;
use tracing::debug;

pub struct PreloadManager {
    wayfinder: Arc<Wayfinder>,
}

impl PreloadManager {
    pub fn new(wayfinder: Arc<Wayfinder>) -> Self {
        Self { wayfinder }
    }

    /// Fire-and-forget a preload fetch for `tx_id`; failures are logged and
    /// swallowed, mirroring the background-refill error policy of §7.
    pub fn preload(&self, tx_id: String, content_type: Option<String>, now: i64) {
        let wayfinder = Arc::clone(&self.wayfinder);
        tokio::spawn(async move {
            let request = ContentRequest {
                tx_id: tx_id.clone(),
                path: None,
                content_type,
                size: None,
                preferred_gateway: None,
            };
            if let Err(e) = wayfinder.get_content(&request, false, true, now).await {
                debug!(tx_id, error = %e, "preload fetch failed, ignoring");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WayfinderConfig;
    use crate::event_bus::EventBus;
    use crate::gateway::routing::RandomStrategy;
    use crate::gateway::StaticProvider;

    #[tokio::test]
    async fn preload_does_not_panic_on_fetch_failure() {
        let provider = Arc::new(StaticProvider::new(vec!["https://unreachable.invalid".to_string()]));
        let strategy = Arc::new(RandomStrategy);
        let wayfinder = Arc::new(Wayfinder::new(
            WayfinderConfig::default(),
            provider,
            strategy,
            None,
            EventBus::new(),
        ));
        let manager = PreloadManager::new(wayfinder);
        manager.preload("tx1".to_string(), None, 0);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
