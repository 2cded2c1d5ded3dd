//! Per-transaction vote accumulation.

use indexmap::IndexMap;
use rta_common::{
    api::SupernodeSignature,
    crypto::PublicKey,
    payment::VoteResult,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("supernode {0} already voted")]
    DuplicateSigner(PublicKey),
    #[error("result {0} cannot be tallied")]
    UntalliableResult(VoteResult),
}

/// Admitted votes for one transaction, split into approvals and rejections.
///
/// Both sets are keyed by the signer's identity key, so a signer appears at
/// most once across the whole tally: the first admissible vote wins and any
/// later vote from the same signer is refused.
#[derive(Debug, Clone, Default)]
pub struct VoteTally {
    approved: IndexMap<PublicKey, SupernodeSignature>,
    rejected: IndexMap<PublicKey, SupernodeSignature>,
}

impl VoteTally {
    pub fn approved_count(&self) -> usize {
        self.approved.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn has_voted(&self, signer: &PublicKey) -> bool {
        self.approved.contains_key(signer) || self.rejected.contains_key(signer)
    }

    /// Signatures of the approving supernodes, in admission order. These are
    /// attached to the transaction when it is pushed to the ledger.
    pub fn approved_signatures(&self) -> impl Iterator<Item = &SupernodeSignature> {
        self.approved.values()
    }

    /// Fold a verified vote into the tally. Only `Approved` and `Rejected`
    /// are admissible, and only the signer's first vote counts.
    pub fn admit(
        &mut self,
        result: VoteResult,
        signature: SupernodeSignature,
    ) -> Result<(), TallyError> {
        if self.has_voted(&signature.id_key) {
            return Err(TallyError::DuplicateSigner(signature.id_key));
        }
        match result {
            VoteResult::Approved => self.approved.insert(signature.id_key, signature),
            VoteResult::Rejected => self.rejected.insert(signature.id_key, signature),
            VoteResult::Invalid => return Err(TallyError::UntalliableResult(result)),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rta_common::crypto::KeyPair;

    fn signature_for(keypair: &KeyPair) -> SupernodeSignature {
        let sig = keypair.sign(b"test");
        SupernodeSignature {
            id_key: keypair.public_key(),
            result_signature: sig,
            tx_signature: sig,
        }
    }

    #[test]
    fn test_admit_both_sides() {
        let mut tally = VoteTally::default();
        tally
            .admit(VoteResult::Approved, signature_for(&KeyPair::generate()))
            .unwrap();
        tally
            .admit(VoteResult::Rejected, signature_for(&KeyPair::generate()))
            .unwrap();
        assert_eq!(tally.approved_count(), 1);
        assert_eq!(tally.rejected_count(), 1);
    }

    #[test]
    fn test_duplicate_signer_refused() {
        let keypair = KeyPair::generate();
        let mut tally = VoteTally::default();
        tally
            .admit(VoteResult::Approved, signature_for(&keypair))
            .unwrap();

        // same signer, same side
        let err = tally
            .admit(VoteResult::Approved, signature_for(&keypair))
            .unwrap_err();
        assert_eq!(err, TallyError::DuplicateSigner(keypair.public_key()));

        // same signer, flipped side: the sets stay disjoint
        let err = tally
            .admit(VoteResult::Rejected, signature_for(&keypair))
            .unwrap_err();
        assert_eq!(err, TallyError::DuplicateSigner(keypair.public_key()));
        assert_eq!(tally.approved_count(), 1);
        assert_eq!(tally.rejected_count(), 0);
    }

    #[test]
    fn test_invalid_never_tallied() {
        let mut tally = VoteTally::default();
        let err = tally
            .admit(VoteResult::Invalid, signature_for(&KeyPair::generate()))
            .unwrap_err();
        assert_eq!(err, TallyError::UntalliableResult(VoteResult::Invalid));
        assert_eq!(tally.approved_count(), 0);
        assert_eq!(tally.rejected_count(), 0);
    }

    #[test]
    fn test_approved_signatures_in_admission_order() {
        let first = KeyPair::generate();
        let second = KeyPair::generate();
        let mut tally = VoteTally::default();
        tally
            .admit(VoteResult::Approved, signature_for(&first))
            .unwrap();
        tally
            .admit(VoteResult::Approved, signature_for(&second))
            .unwrap();
        let order: Vec<PublicKey> = tally
            .approved_signatures()
            .map(|signature| signature.id_key)
            .collect();
        assert_eq!(order, vec![first.public_key(), second.public_key()]);
    }
}
