use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rean_crypto::Verifier;
use rean_fork_choice::ghost_head;
use rean_state_transition::state_transition;
use rean_storage::Storage;
use rean_types::{
    INTERVALS_PER_SLOT, JUSTIFICATION_LOOKBACK, SECONDS_PER_INTERVAL, SECONDS_PER_SLOT, ShortRoot,
    attestation::{Attestation, AttestationData, SignedAttestation},
    block::{Block, SignedBlockWithAttestation},
    is_justifiable_after,
    primitives::{H256, ssz::TreeHash},
    signature::Signature,
    state::{Checkpoint, Config, State},
};
use tracing::{debug, info, warn};

use crate::{Clock, metrics};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("parent state not found for {0}")]
    MissingParentState(H256),
    #[error("block not found for {0}")]
    MissingBlock(H256),
    #[error("signature count mismatch: got {got}, want {want}")]
    InvalidSignatureCount { got: usize, want: usize },
    #[error("invalid signature for validator {validator}")]
    SignatureInvalid { validator: u64 },
    #[error("validator {validator} is not proposer for slot {slot}")]
    NotProposer { validator: u64, slot: u64 },
    #[error("signing failed: {0}")]
    Signing(#[from] rean_crypto::SignError),
    #[error(transparent)]
    Transition(#[from] rean_state_transition::Error),
}

/// Why an attestation was dropped during validation.
///
/// Attestation failures never propagate as errors; they are tagged,
/// counted, and forgotten so a malformed vote cannot harm liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RejectReason {
    MissingSource,
    MissingTarget,
    MissingHead,
    Topology,
    Consistency,
    TooNew,
}

impl RejectReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::MissingSource => "missing_source",
            Self::MissingTarget => "missing_target",
            Self::MissingHead => "missing_head",
            Self::Topology => "topology",
            Self::Consistency => "consistency",
            Self::TooNew => "too_new",
        }
    }
}

/// A consistent snapshot of the fork choice head and checkpoint state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    pub head: H256,
    pub head_slot: u64,
    pub justified_slot: u64,
    pub finalized_slot: u64,
    pub finalized_root: H256,
}

/// Forkchoice store tracking chain state and validator attestations.
///
/// This is the "local view" that a node uses to run LMD GHOST. It contains:
///
/// - which blocks and states are known (via the storage layer),
/// - which checkpoints are justified and finalized,
/// - which block is currently considered the head,
/// - and, for each validator, their latest attestation that should
///   influence fork choice.
///
/// The store is updated whenever:
/// - a new block is processed,
/// - an attestation is received (via a block or gossip),
/// - an interval tick occurs (activating new attestations),
/// - or when the head is recomputed.
///
/// Every entry point serializes through one store-wide mutex; holders
/// never perform I/O beyond the storage maps.
pub struct Store<V> {
    inner: Mutex<StoreInner>,
    verifier: V,
    clock: Option<Arc<dyn Clock>>,
}

pub(crate) struct StoreInner {
    /// Current time in intervals since genesis.
    pub(crate) time: u64,

    /// Chain configuration parameters.
    pub(crate) config: Config,

    /// Root of the current canonical chain head block.
    ///
    /// This is the result of running the fork choice algorithm on the
    /// current contents of the store.
    pub(crate) head: H256,

    /// Root of the current safe target for attestation.
    ///
    /// Bounds validator vote targets to history that already has
    /// supermajority support among pending votes.
    pub(crate) safe_target: H256,

    /// Highest slot justified checkpoint known to the store.
    ///
    /// LMD GHOST starts from this checkpoint when computing the head.
    pub(crate) latest_justified: Checkpoint,

    /// Highest slot finalized checkpoint known to the store.
    ///
    /// Everything strictly before this checkpoint is immutable; fork
    /// choice will never revert finalized history.
    pub(crate) latest_finalized: Checkpoint,

    /// Block, envelope, and post-state storage, keyed by block root.
    pub(crate) storage: Arc<dyn Storage>,

    /// Latest attestation per validator that has been processed.
    ///
    /// These are "known" and contribute to fork choice weights.
    pub(crate) latest_known_attestations: HashMap<u64, SignedAttestation>,

    /// Latest attestation per validator that is pending acceptance.
    ///
    /// These are "new" and do not yet contribute to fork choice. They
    /// migrate to `latest_known_attestations` via interval ticks.
    pub(crate) latest_new_attestations: HashMap<u64, SignedAttestation>,
}

impl<V: Verifier> Store<V> {
    /// Initialize a store from an anchor state and block.
    ///
    /// # Panics
    ///
    /// Panics if the anchor block's state root does not match the anchor
    /// state. A node bootstrapped from a bad anchor cannot make progress,
    /// so this aborts instead of returning an error.
    pub fn new(
        anchor_state: State,
        anchor_block: Block,
        storage: Arc<dyn Storage>,
        verifier: V,
    ) -> Self {
        let anchor_state_root = anchor_state.tree_hash_root();
        assert_eq!(
            anchor_block.state_root, anchor_state_root,
            "anchor block state root mismatch"
        );

        let anchor_root = anchor_block.tree_hash_root();
        let anchor_slot = anchor_block.slot;

        storage.put_block(anchor_root, anchor_block.clone());
        storage.put_signed_block(anchor_root, SignedBlockWithAttestation::unsigned(anchor_block));
        storage.put_state(anchor_root, anchor_state.clone());

        let anchor_checkpoint = Checkpoint {
            root: anchor_root,
            slot: anchor_slot,
        };

        info!(%anchor_state_root, %anchor_root, "Initialized store");

        Self {
            inner: Mutex::new(StoreInner {
                time: anchor_slot * INTERVALS_PER_SLOT,
                config: anchor_state.config.clone(),
                head: anchor_root,
                safe_target: anchor_root,
                latest_justified: anchor_checkpoint,
                latest_finalized: anchor_checkpoint,
                storage,
                latest_known_attestations: HashMap::new(),
                latest_new_attestations: HashMap::new(),
            }),
            verifier,
            clock: None,
        }
    }

    /// Initialize a store from a genesis state, deriving the anchor block.
    pub fn from_genesis(genesis_state: State, storage: Arc<dyn Storage>, verifier: V) -> Self {
        let genesis_block = rean_state_transition::genesis_block(&genesis_state);
        Self::new(genesis_state, genesis_block, storage, verifier)
    }

    /// Attach a wall clock so gossip entry points advance store time on
    /// their own. Without one, time only moves via `advance_time`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store lock poisoned")
    }

    /// Process a new signed block envelope and update chain state.
    ///
    /// Attestation processing follows on_block ordering:
    ///  1. State transition on the bare block.
    ///  2. Signature count and signature verification.
    ///  3. Process body attestations as on-chain votes.
    ///  4. Update head.
    ///  5. Process the proposer attestation as a gossip vote.
    ///
    /// Processing is transactional: any failure leaves the store
    /// untouched. Re-submitting a known block is a no-op returning `Ok`.
    pub fn process_block(&self, envelope: SignedBlockWithAttestation) -> Result<(), StoreError> {
        let start = Instant::now();
        let result = self.lock().process_block(&self.verifier, envelope);
        metrics::observe_fork_choice_block_processing_time(start.elapsed().as_secs_f64());
        result
    }

    /// Process an attestation received from the network.
    ///
    /// All failures are dropped silently (tagged by metric and log);
    /// a malformed or untimely attestation must not harm liveness.
    pub fn process_attestation(&self, attestation: SignedAttestation) {
        let mut inner = self.lock();
        if let Some(clock) = &self.clock {
            inner.advance_time(clock.now_unix(), false);
        }
        inner.process_attestation_internal(&self.verifier, attestation, false, true);
    }

    /// Advance the store to the given wall-clock time, running
    /// interval-specific actions for each interval crossed.
    pub fn advance_time(&self, now_unix: u64, has_proposal: bool) {
        self.lock().advance_time(now_unix, has_proposal);
    }

    /// Advance by one interval and perform its action.
    pub fn tick_interval(&self, has_proposal: bool) {
        self.lock().tick_interval(has_proposal);
    }

    /// Move pending attestations to known and recompute the head.
    pub fn accept_new_attestations(&self) {
        self.lock().accept_new_attestations();
    }

    /// Recompute the safe target from pending votes.
    pub fn update_safe_target(&self) {
        self.lock().update_safe_target();
    }

    /// Returns a consistent snapshot of the chain head and checkpoints.
    pub fn get_status(&self) -> ChainStatus {
        let inner = self.lock();
        let head_slot = inner
            .storage
            .get_block(&inner.head)
            .map(|block| block.slot)
            .unwrap_or(0);
        ChainStatus {
            head: inner.head,
            head_slot,
            justified_slot: inner.latest_justified.slot,
            finalized_slot: inner.latest_finalized.slot,
            finalized_root: inner.latest_finalized.root,
        }
    }

    /// The head to build on when proposing at `slot`: advances time to
    /// the slot boundary and activates pending votes first.
    pub fn get_proposal_head(&self, slot: u64) -> H256 {
        let mut inner = self.lock();
        let slot_time = inner.config.genesis_time + slot * SECONDS_PER_SLOT;
        inner.advance_time(slot_time, true);
        inner.accept_new_attestations();
        inner.head
    }

    /// The target checkpoint validators should vote for.
    pub fn get_vote_target(&self) -> Checkpoint {
        self.lock().get_vote_target()
    }

    pub fn head(&self) -> H256 {
        self.lock().head
    }

    pub fn safe_target(&self) -> H256 {
        self.lock().safe_target
    }

    pub fn latest_justified(&self) -> Checkpoint {
        self.lock().latest_justified
    }

    pub fn latest_finalized(&self) -> Checkpoint {
        self.lock().latest_finalized
    }

    /// Store time in intervals since genesis.
    pub fn time(&self) -> u64 {
        self.lock().time
    }

    pub fn num_validators(&self) -> u64 {
        self.lock().config.num_validators
    }

    /// Handle to the underlying block/state storage.
    pub fn storage(&self) -> Arc<dyn Storage> {
        self.lock().storage.clone()
    }

    /// The pending (not yet fork-choice-active) attestation for a validator.
    pub fn latest_new_attestation(&self, validator: u64) -> Option<SignedAttestation> {
        self.lock().latest_new_attestations.get(&validator).cloned()
    }

    /// The accepted attestation for a validator.
    pub fn latest_known_attestation(&self, validator: u64) -> Option<SignedAttestation> {
        self.lock()
            .latest_known_attestations
            .get(&validator)
            .cloned()
    }

    pub(crate) fn lock_inner(&self) -> MutexGuard<'_, StoreInner> {
        self.lock()
    }

    pub(crate) fn verifier(&self) -> &V {
        &self.verifier
    }

    pub(crate) fn clock_ref(&self) -> Option<&Arc<dyn Clock>> {
        self.clock.as_ref()
    }
}

impl StoreInner {
    pub(crate) fn process_block(
        &mut self,
        verifier: &dyn Verifier,
        envelope: SignedBlockWithAttestation,
    ) -> Result<(), StoreError> {
        let block = &envelope.message.block;
        let slot = block.slot;
        let block_root = block.tree_hash_root();

        if self.storage.has_block(&block_root) {
            return Ok(()); // already known
        }

        let parent_state = self
            .storage
            .get_state(&block.parent_root)
            .ok_or(StoreError::MissingParentState(block.parent_root))?;

        let new_state = state_transition(&parent_state, block)?;

        // Validate signature list shape: one signature per body
        // attestation, plus the proposer signature when present.
        let got = envelope.signature.len();
        let want = envelope.expected_signatures();
        if got != want {
            return Err(StoreError::InvalidSignatureCount { got, want });
        }

        // Verify body attestation signatures against the parent state's
        // registry (the validator set is fixed at genesis).
        for (attestation, signature) in block
            .body
            .attestations
            .iter()
            .zip(envelope.signature.iter())
        {
            verify_attestation_signature(verifier, &parent_state, attestation, signature)?;
        }

        // The proposer signature is always last in the vector.
        if let Some(proposer_attestation) = envelope.message.proposer_attestation.as_ref() {
            let signature = envelope
                .signature
                .last()
                .expect("count validated above");
            verify_attestation_signature(verifier, &parent_state, proposer_attestation, signature)?;
        }

        // All checks passed; no partial insert before this point.
        self.storage.put_block(block_root, block.clone());
        self.storage.put_state(block_root, new_state.clone());

        // Monotonically lift checkpoints from the new state, regardless
        // of which fork it extends.
        if new_state.latest_justified.slot > self.latest_justified.slot {
            self.latest_justified = new_state.latest_justified;
            metrics::update_latest_justified_slot(self.latest_justified.slot);
        }
        if new_state.latest_finalized.slot > self.latest_finalized.slot {
            self.latest_finalized = new_state.latest_finalized;
            metrics::update_latest_finalized_slot(self.latest_finalized.slot);
        }

        // Body attestations count as on-chain votes; their signatures
        // were verified above, so skip re-verification.
        for (attestation, signature) in block
            .body
            .attestations
            .iter()
            .zip(envelope.signature.iter())
        {
            let signed = SignedAttestation {
                message: attestation.clone(),
                signature: signature.clone(),
            };
            self.process_attestation_internal(verifier, signed, true, false);
        }

        self.update_head();

        // The proposer's own attestation arrives as a gossip-style vote.
        if let Some(proposer_attestation) = envelope.message.proposer_attestation.as_ref() {
            let signed = SignedAttestation {
                message: proposer_attestation.clone(),
                signature: envelope
                    .signature
                    .last()
                    .cloned()
                    .expect("count validated above"),
            };
            self.process_attestation_internal(verifier, signed, false, false);
        }

        let state_root = block.state_root;
        self.storage.put_signed_block(block_root, envelope);

        info!(slot, block_root = %ShortRoot(&block_root), %state_root, "Processed block");
        Ok(())
    }

    pub(crate) fn process_attestation_internal(
        &mut self,
        verifier: &dyn Verifier,
        attestation: SignedAttestation,
        on_chain: bool,
        verify_signature: bool,
    ) {
        let start = Instant::now();
        let validator_id = attestation.message.validator_id;
        let data_slot = attestation.message.data.slot;
        let source = if on_chain { "block" } else { "gossip" };

        if let Some(reason) = self.validate_attestation(&attestation.message.data) {
            debug!(
                source,
                validator = validator_id,
                slot = data_slot,
                reason = reason.as_str(),
                "Attestation rejected"
            );
            metrics::inc_attestations_rejected(source, reason.as_str());
            return;
        }

        if verify_signature {
            // The registry is fixed, so the head state's keys serve for
            // any attestation.
            let Some(head_state) = self.storage.get_state(&self.head) else {
                return;
            };
            if verify_attestation_signature(
                verifier,
                &head_state,
                &attestation.message,
                &attestation.signature,
            )
            .is_err()
            {
                metrics::inc_attestations_invalid(source);
                return;
            }
        }

        if on_chain {
            // On-chain: replace the known attestation if this is newer.
            let replace = self
                .latest_known_attestations
                .get(&validator_id)
                .is_none_or(|existing| existing.message.data.slot < data_slot);
            if replace {
                self.latest_known_attestations
                    .insert(validator_id, attestation);
            }
            // A pending attestation of equal or lower slot is superseded.
            if self
                .latest_new_attestations
                .get(&validator_id)
                .is_some_and(|pending| pending.message.data.slot <= data_slot)
            {
                self.latest_new_attestations.remove(&validator_id);
            }
        } else {
            // Gossip votes for future slots wait for their slot to start.
            let current_slot = self.time / INTERVALS_PER_SLOT;
            if data_slot > current_slot {
                metrics::inc_attestations_rejected(source, RejectReason::TooNew.as_str());
                return;
            }
            let replace = self
                .latest_new_attestations
                .get(&validator_id)
                .is_none_or(|existing| existing.message.data.slot < data_slot);
            if replace {
                self.latest_new_attestations
                    .insert(validator_id, attestation);
            }
        }

        metrics::inc_attestations_valid(source);
        metrics::observe_attestation_validation_time(start.elapsed().as_secs_f64());
    }

    /// Validation shared by individual and aggregated attestations.
    ///
    /// Superseding decisions happen later and use `data.slot`, never
    /// `data.target.slot`: an older slot's message must not displace a
    /// newer one that arrived first.
    pub(crate) fn validate_attestation(&self, data: &AttestationData) -> Option<RejectReason> {
        // Availability: source, target, and head blocks must exist.
        let Some(source_block) = self.storage.get_block(&data.source.root) else {
            return Some(RejectReason::MissingSource);
        };
        let Some(target_block) = self.storage.get_block(&data.target.root) else {
            return Some(RejectReason::MissingTarget);
        };
        if !self.storage.has_block(&data.head.root) {
            return Some(RejectReason::MissingHead);
        }

        // Topology: source cannot be after target.
        if source_block.slot > target_block.slot || data.source.slot > data.target.slot {
            return Some(RejectReason::Topology);
        }

        // Consistency: declared slots must match the stored blocks.
        if source_block.slot != data.source.slot || target_block.slot != data.target.slot {
            return Some(RejectReason::Consistency);
        }

        // Time: at most one slot ahead of the store clock.
        let current_slot = self.time / INTERVALS_PER_SLOT;
        if data.slot > current_slot + 1 {
            return Some(RejectReason::TooNew);
        }

        None
    }

    pub(crate) fn advance_time(&mut self, now_unix: u64, has_proposal: bool) {
        if now_unix <= self.config.genesis_time {
            return;
        }
        let target = (now_unix - self.config.genesis_time) / SECONDS_PER_INTERVAL;
        while self.time < target {
            self.tick_interval(has_proposal && self.time + 1 == target);
        }
    }

    pub(crate) fn tick_interval(&mut self, has_proposal: bool) {
        self.time += 1;
        metrics::update_current_slot(self.time / INTERVALS_PER_SLOT);

        match self.time % INTERVALS_PER_SLOT {
            0 => {
                // Start of slot: activate pending votes ahead of a local
                // proposal so the proposer builds on the latest view.
                if has_proposal {
                    self.accept_new_attestations();
                }
            }
            2 => self.update_safe_target(),
            3 => self.accept_new_attestations(),
            // Interval 1 is validator voting; no store-side action.
            _ => {}
        }
    }

    pub(crate) fn accept_new_attestations(&mut self) {
        let pending = std::mem::take(&mut self.latest_new_attestations);
        self.latest_known_attestations.extend(pending);
        self.update_head();
    }

    pub(crate) fn update_head(&mut self) {
        let blocks = self.storage.all_blocks();
        let head = ghost_head(
            &blocks,
            self.latest_justified.root,
            &self.latest_known_attestations,
            0,
        );

        if head != self.head {
            let is_extension = blocks
                .get(&head)
                .is_some_and(|block| block.parent_root == self.head);
            if !is_extension {
                metrics::inc_fork_choice_reorgs();
                debug!(old = %ShortRoot(&self.head), new = %ShortRoot(&head), "Head reorged");
            }
        }

        self.head = head;
        metrics::update_head_slot(blocks.get(&head).map(|block| block.slot).unwrap_or(0));
    }

    /// Recompute the safe target: the deepest block with supermajority
    /// support among pending votes.
    pub(crate) fn update_safe_target(&mut self) {
        let min_score = (self.config.num_validators * 2).div_ceil(3);
        let blocks = self.storage.all_blocks();
        self.safe_target = ghost_head(
            &blocks,
            self.latest_justified.root,
            &self.latest_new_attestations,
            min_score,
        );
        if let Some(block) = blocks.get(&self.safe_target) {
            metrics::update_safe_target_slot(block.slot);
        }
    }

    /// The checkpoint validators should vote for: the head, walked back
    /// up to `JUSTIFICATION_LOOKBACK` steps toward the safe target, then
    /// further until the slot is justifiable after the finalized slot.
    pub(crate) fn get_vote_target(&self) -> Checkpoint {
        let blocks = self.storage.all_blocks();
        let mut target_root = self.head;

        for _ in 0..JUSTIFICATION_LOOKBACK {
            if let (Some(target_block), Some(safe_block)) =
                (blocks.get(&target_root), blocks.get(&self.safe_target))
                && target_block.slot > safe_block.slot
            {
                target_root = target_block.parent_root;
            }
        }

        while let Some(block) = blocks.get(&target_root)
            && !is_justifiable_after(block.slot, self.latest_finalized.slot)
        {
            target_root = block.parent_root;
        }

        let slot = blocks
            .get(&target_root)
            .map(|block| block.slot)
            .expect("vote target resolves to a known block");
        Checkpoint {
            root: target_root,
            slot,
        }
    }
}

/// Verify one attestation signature against a state's validator registry.
///
/// The signing context is the attestation's `data.slot` (mod 2^32) and
/// the message is the hash tree root of the whole attestation.
pub(crate) fn verify_attestation_signature(
    verifier: &dyn Verifier,
    state: &State,
    attestation: &Attestation,
    signature: &Signature,
) -> Result<(), StoreError> {
    let validator = attestation.validator_id;
    let Some(entry) = state.validators.get(validator as usize) else {
        warn!(validator, "Attestation from unknown validator");
        return Err(StoreError::SignatureInvalid { validator });
    };

    let message = attestation.tree_hash_root();
    let context = attestation.data.slot as u32;

    verifier
        .verify(&entry.pubkey, context, &message, signature)
        .map_err(|err| {
            warn!(validator, slot = attestation.data.slot, %err, "Attestation signature invalid");
            StoreError::SignatureInvalid { validator }
        })
}
