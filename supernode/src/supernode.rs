//! Local node identity and the RTA signing scheme.
//!
//! A vote carries two signatures: one over the ASCII string
//! `"<tx_id_hex>:<result_int>"` binding the verdict to the transaction, and
//! one over the raw 32-byte tx id, which is the form later attached to the
//! ledger submission. Both must verify under the signer's identity key.

use rta_common::{
    api::{AuthorizeRtaResponse, SupernodeSignature, UpdatePaymentStatusBroadcast},
    crypto::{Hash, KeyPair, PublicKey, Signature},
    payment::{PaymentId, RtaStatus, VoteResult},
};

pub struct Supernode {
    keypair: KeyPair,
}

impl Supernode {
    pub fn new(keypair: KeyPair) -> Self {
        Supernode { keypair }
    }

    pub fn id_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn id_key_hex(&self) -> String {
        self.keypair.public_key().to_hex()
    }

    pub fn sign_message(&self, message: &str) -> Signature {
        self.keypair.sign(message.as_bytes())
    }

    pub fn sign_hash(&self, hash: &Hash) -> Signature {
        self.keypair.sign(hash.as_bytes())
    }

    /// Produce this node's signature triple for a vote.
    pub fn sign_vote(&self, tx_id: &Hash, result: VoteResult) -> SupernodeSignature {
        let message = AuthorizeRtaResponse::result_message(tx_id, result);
        SupernodeSignature {
            id_key: self.id_key(),
            result_signature: self.sign_message(&message),
            tx_signature: self.sign_hash(tx_id),
        }
    }

    /// Sign a terminal status announcement for a payment.
    pub fn sign_status(&self, payment_id: &PaymentId, status: RtaStatus) -> Signature {
        let message = UpdatePaymentStatusBroadcast::status_message(payment_id, status);
        self.sign_message(&message)
    }
}

/// Check both signatures of a peer vote under its claimed identity key.
pub fn verify_vote(vote: &AuthorizeRtaResponse) -> bool {
    let message = AuthorizeRtaResponse::result_message(&vote.tx_id, vote.result);
    let signer = &vote.signature.id_key;
    signer
        .verify(message.as_bytes(), &vote.signature.result_signature)
        .is_ok()
        && signer
            .verify(vote.tx_id.as_bytes(), &vote.signature.tx_signature)
            .is_ok()
}

/// Check a status broadcast signature under the broadcasting node's key.
pub fn verify_status(broadcast: &UpdatePaymentStatusBroadcast, signer: &PublicKey) -> bool {
    let message =
        UpdatePaymentStatusBroadcast::status_message(&broadcast.payment_id, broadcast.status);
    signer
        .verify(message.as_bytes(), &broadcast.signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rta_common::crypto::hash;

    #[test]
    fn test_vote_signatures_verify() {
        let node = Supernode::new(KeyPair::generate());
        let tx_id = hash(b"tx");
        let vote = AuthorizeRtaResponse {
            tx_id: tx_id.clone(),
            result: VoteResult::Approved,
            signature: node.sign_vote(&tx_id, VoteResult::Approved),
        };
        assert!(verify_vote(&vote));
    }

    #[test]
    fn test_vote_bound_to_result() {
        let node = Supernode::new(KeyPair::generate());
        let tx_id = hash(b"tx");
        let mut vote = AuthorizeRtaResponse {
            tx_id: tx_id.clone(),
            result: VoteResult::Approved,
            signature: node.sign_vote(&tx_id, VoteResult::Approved),
        };
        // flipping the verdict invalidates the result signature
        vote.result = VoteResult::Rejected;
        assert!(!verify_vote(&vote));
    }

    #[test]
    fn test_vote_rejects_wrong_signer_key() {
        let signer = Supernode::new(KeyPair::generate());
        let impostor = Supernode::new(KeyPair::generate());
        let tx_id = hash(b"tx");
        let mut vote = AuthorizeRtaResponse {
            tx_id: tx_id.clone(),
            result: VoteResult::Approved,
            signature: signer.sign_vote(&tx_id, VoteResult::Approved),
        };
        // claim the signature came from another identity
        vote.signature.id_key = impostor.id_key();
        assert!(!verify_vote(&vote));
    }

    #[test]
    fn test_status_signature_verifies() {
        let node = Supernode::new(KeyPair::generate());
        let payment_id = PaymentId::random();
        let broadcast = UpdatePaymentStatusBroadcast {
            payment_id,
            status: RtaStatus::Success,
            signature: node.sign_status(&payment_id, RtaStatus::Success),
        };
        assert!(verify_status(&broadcast, &node.id_key()));
        assert!(!verify_status(
            &broadcast,
            &KeyPair::generate().public_key()
        ));
    }
}
