//! Process-wide payment state, keyed by transaction or payment id.
//!
//! Every entry carries a TTL (refreshed on write, never on read); an expired
//! entry is indistinguishable from one that never existed, which is how the
//! whole protocol times out. Each facet lives in its own map so access is
//! typed and writers are linearizable per key; no ordering is guaranteed
//! across different keys.

use std::time::{Duration, Instant};

use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, warn};
use rta_common::{
    api::SupernodeSignature,
    crypto::Hash,
    payment::{PaymentId, RtaStatus, VoteResult},
    transaction::Transaction,
};

use crate::tally::{TallyError, VoteTally};

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Slot {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Outcome of an atomic vote admission: the exact tally counts right after
/// this vote landed, so the caller observes quorum crossings exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyCounts {
    pub approved: usize,
    pub rejected: usize,
    /// True when this vote created (or re-created after expiry) the tally.
    pub created: bool,
}

pub struct PaymentContext {
    ttl: Duration,
    txs: DashMap<Hash, Slot<Transaction>>,
    payment_ids: DashMap<Hash, Slot<PaymentId>>,
    amounts: DashMap<Hash, Slot<u64>>,
    tallies: DashMap<Hash, Slot<VoteTally>>,
    statuses: DashMap<PaymentId, Slot<RtaStatus>>,
}

fn get_live<K, V>(map: &DashMap<K, Slot<V>>, key: &K) -> Option<V>
where
    K: Eq + std::hash::Hash + Clone,
    V: Clone,
{
    {
        let slot = map.get(key)?;
        if !slot.is_expired() {
            return Some(slot.value.clone());
        }
    }
    // the read guard is dropped; reap the expired slot unless it was
    // refreshed in between
    map.remove_if(key, |_, slot| slot.is_expired());
    None
}

impl PaymentContext {
    pub fn new(ttl: Duration) -> Self {
        PaymentContext {
            ttl,
            txs: DashMap::new(),
            payment_ids: DashMap::new(),
            amounts: DashMap::new(),
            tallies: DashMap::new(),
            statuses: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store_tx(&self, tx_id: Hash, tx: Transaction) {
        self.txs.insert(tx_id, Slot::new(tx, self.ttl));
    }

    pub fn tx_for(&self, tx_id: &Hash) -> Option<Transaction> {
        get_live(&self.txs, tx_id)
    }

    pub fn has_tx(&self, tx_id: &Hash) -> bool {
        self.txs
            .get(tx_id)
            .map(|slot| !slot.is_expired())
            .unwrap_or(false)
    }

    pub fn store_payment_id(&self, tx_id: Hash, payment_id: PaymentId) {
        self.payment_ids
            .insert(tx_id, Slot::new(payment_id, self.ttl));
    }

    pub fn payment_id_for(&self, tx_id: &Hash) -> Option<PaymentId> {
        get_live(&self.payment_ids, tx_id)
    }

    pub fn store_amount(&self, tx_id: Hash, amount: u64) {
        self.amounts.insert(tx_id, Slot::new(amount, self.ttl));
    }

    pub fn amount_for(&self, tx_id: &Hash) -> Option<u64> {
        get_live(&self.amounts, tx_id)
    }

    /// Write a payment status. A live finite status is sticky: the write is
    /// silently dropped and the surviving status is returned.
    pub fn update_status(&self, payment_id: PaymentId, status: RtaStatus) -> RtaStatus {
        match self.statuses.entry(payment_id) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if !slot.is_expired() && slot.value.is_finite() {
                    debug!(
                        "payment: {}, status {} kept, dropping write of {}",
                        payment_id, slot.value, status
                    );
                    return slot.value;
                }
                *slot = Slot::new(status, self.ttl);
                status
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(status, self.ttl));
                status
            }
        }
    }

    pub fn status_for(&self, payment_id: &PaymentId) -> Option<RtaStatus> {
        get_live(&self.statuses, payment_id)
    }

    /// Fold a verified vote into the transaction's tally, atomically with
    /// respect to other votes for the same transaction. The admission
    /// decision and the returned counts are made under the entry's exclusive
    /// guard, so concurrent votes serialize and each caller sees the exact
    /// counts its own vote produced. A refused vote does not refresh the TTL.
    pub fn admit_vote(
        &self,
        tx_id: &Hash,
        result: VoteResult,
        signature: SupernodeSignature,
    ) -> Result<TallyCounts, TallyError> {
        let ttl = self.ttl;
        match self.tallies.entry(tx_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                let created = slot.is_expired();
                if created {
                    *slot = Slot::new(VoteTally::default(), ttl);
                }
                slot.value.admit(result, signature)?;
                slot.expires_at = Instant::now() + ttl;
                Ok(TallyCounts {
                    approved: slot.value.approved_count(),
                    rejected: slot.value.rejected_count(),
                    created,
                })
            }
            Entry::Vacant(vacant) => {
                let mut tally = VoteTally::default();
                tally.admit(result, signature)?;
                let counts = TallyCounts {
                    approved: tally.approved_count(),
                    rejected: tally.rejected_count(),
                    created: true,
                };
                vacant.insert(Slot::new(tally, ttl));
                Ok(counts)
            }
        }
    }

    pub fn tally_counts(&self, tx_id: &Hash) -> Option<TallyCounts> {
        let slot = self.tallies.get(tx_id)?;
        if slot.is_expired() {
            return None;
        }
        Some(TallyCounts {
            approved: slot.value.approved_count(),
            rejected: slot.value.rejected_count(),
            created: false,
        })
    }

    /// Approving signatures accumulated so far, in admission order.
    pub fn approved_signatures(&self, tx_id: &Hash) -> Option<Vec<SupernodeSignature>> {
        let slot = self.tallies.get(tx_id)?;
        if slot.is_expired() {
            return None;
        }
        Some(slot.value.approved_signatures().cloned().collect())
    }

    /// Drop every entry belonging to a payment. Used when a completed
    /// payment is cleaned up ahead of its TTL.
    pub fn remove_payment(&self, tx_id: &Hash) {
        if let Some(payment_id) = self.payment_id_for(tx_id) {
            self.statuses.remove(&payment_id);
        } else {
            warn!("no payment id for tx: {}, removing tx entries only", tx_id);
        }
        self.txs.remove(tx_id);
        self.payment_ids.remove(tx_id);
        self.amounts.remove(tx_id);
        self.tallies.remove(tx_id);
    }

    /// Reap every expired entry. Reads already treat expired entries as
    /// absent; the sweep only bounds the working set.
    pub fn sweep_expired(&self) -> usize {
        let before = self.len();
        self.txs.retain(|_, slot| !slot.is_expired());
        self.payment_ids.retain(|_, slot| !slot.is_expired());
        self.amounts.retain(|_, slot| !slot.is_expired());
        self.tallies.retain(|_, slot| !slot.is_expired());
        self.statuses.retain(|_, slot| !slot.is_expired());
        before - self.len()
    }

    fn len(&self) -> usize {
        self.txs.len()
            + self.payment_ids.len()
            + self.amounts.len()
            + self.tallies.len()
            + self.statuses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rta_common::{
        crypto::{hash, KeyPair},
        transaction::{TxOutput, TxType},
    };
    use std::thread::sleep;

    const TEST_TTL: Duration = Duration::from_secs(60);

    fn short_lived() -> PaymentContext {
        PaymentContext::new(Duration::from_millis(30))
    }

    fn signature_for(keypair: &KeyPair) -> SupernodeSignature {
        let sig = keypair.sign(b"test");
        SupernodeSignature {
            id_key: keypair.public_key(),
            result_signature: sig,
            tx_signature: sig,
        }
    }

    fn sample_tx() -> Transaction {
        Transaction::new(
            TxType::Rta,
            None,
            vec![TxOutput {
                recipient: KeyPair::generate().public_key(),
                amount: 10,
            }],
        )
    }

    #[test]
    fn test_store_and_read_back() {
        let context = PaymentContext::new(TEST_TTL);
        let tx = sample_tx();
        let tx_id = tx.id();
        context.store_tx(tx_id.clone(), tx.clone());
        context.store_amount(tx_id.clone(), 500);
        context.store_payment_id(tx_id.clone(), PaymentId::new([1; 16]));

        assert!(context.has_tx(&tx_id));
        assert_eq!(context.tx_for(&tx_id), Some(tx));
        assert_eq!(context.amount_for(&tx_id), Some(500));
        assert_eq!(
            context.payment_id_for(&tx_id),
            Some(PaymentId::new([1; 16]))
        );
        assert_eq!(context.amount_for(&hash(b"other")), None);
    }

    #[test]
    fn test_entries_expire() {
        let context = short_lived();
        let tx_id = hash(b"tx");
        context.store_amount(tx_id.clone(), 1);
        assert_eq!(context.amount_for(&tx_id), Some(1));
        sleep(Duration::from_millis(50));
        assert_eq!(context.amount_for(&tx_id), None);
    }

    #[test]
    fn test_write_refreshes_ttl() {
        let context = short_lived();
        let tx_id = hash(b"tx");
        context.store_amount(tx_id.clone(), 1);
        sleep(Duration::from_millis(20));
        context.store_amount(tx_id.clone(), 2);
        sleep(Duration::from_millis(20));
        // 40ms after the first write, 20ms after the refresh
        assert_eq!(context.amount_for(&tx_id), Some(2));
    }

    #[test]
    fn test_finite_status_is_sticky() {
        let context = PaymentContext::new(TEST_TTL);
        let payment_id = PaymentId::new([2; 16]);
        assert_eq!(
            context.update_status(payment_id, RtaStatus::InProgress),
            RtaStatus::InProgress
        );
        assert_eq!(
            context.update_status(payment_id, RtaStatus::FailRejectedByPos),
            RtaStatus::FailRejectedByPos
        );
        // no demotion to a different terminal status nor back to in-progress
        assert_eq!(
            context.update_status(payment_id, RtaStatus::Success),
            RtaStatus::FailRejectedByPos
        );
        assert_eq!(
            context.update_status(payment_id, RtaStatus::InProgress),
            RtaStatus::FailRejectedByPos
        );
        assert_eq!(
            context.status_for(&payment_id),
            Some(RtaStatus::FailRejectedByPos)
        );
    }

    #[test]
    fn test_expired_status_can_be_rewritten() {
        let context = short_lived();
        let payment_id = PaymentId::new([3; 16]);
        context.update_status(payment_id, RtaStatus::Success);
        sleep(Duration::from_millis(50));
        assert_eq!(context.status_for(&payment_id), None);
        assert_eq!(
            context.update_status(payment_id, RtaStatus::FailTimedOut),
            RtaStatus::FailTimedOut
        );
    }

    #[test]
    fn test_admit_vote_counts_and_duplicates() {
        let context = PaymentContext::new(TEST_TTL);
        let tx_id = hash(b"tx");
        let keypair = KeyPair::generate();

        let counts = context
            .admit_vote(&tx_id, VoteResult::Approved, signature_for(&keypair))
            .unwrap();
        assert_eq!(
            counts,
            TallyCounts {
                approved: 1,
                rejected: 0,
                created: true
            }
        );

        let err = context
            .admit_vote(&tx_id, VoteResult::Rejected, signature_for(&keypair))
            .unwrap_err();
        assert!(matches!(err, TallyError::DuplicateSigner(_)));

        let counts = context
            .admit_vote(
                &tx_id,
                VoteResult::Rejected,
                signature_for(&KeyPair::generate()),
            )
            .unwrap();
        assert_eq!(
            counts,
            TallyCounts {
                approved: 1,
                rejected: 1,
                created: false
            }
        );
    }

    #[test]
    fn test_concurrent_votes_count_exactly() {
        let context = std::sync::Arc::new(PaymentContext::new(TEST_TTL));
        let tx_id = hash(b"tx");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let context = context.clone();
            let tx_id = tx_id.clone();
            handles.push(std::thread::spawn(move || {
                context
                    .admit_vote(
                        &tx_id,
                        VoteResult::Approved,
                        signature_for(&KeyPair::generate()),
                    )
                    .unwrap()
            }));
        }
        let mut seen: Vec<usize> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().approved)
            .collect();
        seen.sort_unstable();
        // every admission observed a distinct, exact count
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_payment_clears_all_facets() {
        let context = PaymentContext::new(TEST_TTL);
        let tx = sample_tx();
        let tx_id = tx.id();
        let payment_id = PaymentId::new([4; 16]);
        context.store_tx(tx_id.clone(), tx);
        context.store_payment_id(tx_id.clone(), payment_id);
        context.store_amount(tx_id.clone(), 9);
        context.update_status(payment_id, RtaStatus::Success);

        context.remove_payment(&tx_id);
        assert!(!context.has_tx(&tx_id));
        assert_eq!(context.payment_id_for(&tx_id), None);
        assert_eq!(context.amount_for(&tx_id), None);
        assert_eq!(context.status_for(&payment_id), None);
    }

    #[test]
    fn test_sweep_reaps_expired_entries() {
        let context = short_lived();
        context.store_amount(hash(b"a"), 1);
        context.store_amount(hash(b"b"), 2);
        sleep(Duration::from_millis(50));
        assert_eq!(context.sweep_expired(), 2);
        assert_eq!(context.sweep_expired(), 0);
    }
}
