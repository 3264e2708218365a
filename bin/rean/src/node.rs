//! The main node event loop.

use std::sync::Arc;
use std::time::Duration;

use rean_blockchain::Store;
use rean_crypto::Verifier;
use rean_types::SECONDS_PER_INTERVAL;
use tracing::info;

use crate::clock::NodeClock;
use crate::duties::Duties;

pub struct Node<V: Verifier> {
    store: Arc<Store<V>>,
    clock: NodeClock,
    duties: Duties<V>,
}

impl<V: Verifier> Node<V> {
    pub fn new(store: Arc<Store<V>>, clock: NodeClock, duties: Duties<V>) -> Self {
        Self {
            store,
            clock,
            duties,
        }
    }

    /// Drive the interval ticker until ctrl-c.
    ///
    /// Each tick advances fork-choice time, runs the interval's duty,
    /// and logs a status line on slot boundaries.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(SECONDS_PER_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_slot = u64::MAX;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if self.clock.is_before_genesis() {
                        continue;
                    }

                    let slot = self.clock.current_slot();
                    let interval = self.clock.current_interval();
                    let has_proposal = interval == 0 && self.duties.has_proposal(slot);

                    self.store.advance_time(self.clock.current_time(), has_proposal);
                    self.duties.on_interval(slot, interval);

                    if slot != last_slot {
                        let status = self.store.get_status();
                        info!(
                            slot,
                            head = status.head_slot,
                            justified = status.justified_slot,
                            finalized = status.finalized_slot,
                            "slot"
                        );
                        last_slot = slot;
                    }
                }
            }
        }
    }
}
