//! Minimal model of the ledger transaction voted on by an auth sample.
//!
//! The core never builds or fully validates transactions; it only needs the
//! canonical encoding (to derive the transaction id), the per-supernode fee
//! outputs, the transaction type, and the rta signature section appended on
//! quorum before the transaction is pushed to the ledger. The canonical form
//! excludes the rta signature section, so the id is stable across signing.

use crate::{
    crypto::{hash, Hash, PublicKey, Signature},
    payment::PaymentId,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

pub const TX_VERSION: u8 = 1;
// u8 length prefixes bound both sections
pub const MAX_OUTPUTS: usize = 255;
pub const MAX_RTA_SIGNATURES: usize = 255;

/// Type of a ledger transaction. Only `Rta` transactions are eligible for
/// real-time authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Transfer,
    Rta,
}

impl Serializer for TxType {
    fn write(&self, writer: &mut Writer) {
        let value = match self {
            TxType::Transfer => 0u8,
            TxType::Rta => 1u8,
        };
        writer.write_u8(value);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(TxType::Transfer),
            1 => Ok(TxType::Rta),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

/// A single output: `amount` atomic units destined for `recipient`.
/// Supernode fees assigned by the payer wallet are regular outputs keyed by
/// the supernode's identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub recipient: PublicKey,
    pub amount: u64,
}

impl Serializer for TxOutput {
    fn write(&self, writer: &mut Writer) {
        self.recipient.write(writer);
        writer.write_u64(self.amount);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(TxOutput {
            recipient: PublicKey::read(reader)?,
            amount: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        self.recipient.size() + 8
    }
}

/// Committee signature attached to an approved transaction before it is
/// submitted to the ledger: the supernode's signature over the raw tx id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtaSignature {
    pub id_key: PublicKey,
    pub signature: Signature,
}

impl Serializer for RtaSignature {
    fn write(&self, writer: &mut Writer) {
        self.id_key.write(writer);
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(RtaSignature {
            id_key: PublicKey::read(reader)?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.id_key.size() + self.signature.size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: u8,
    tx_type: TxType,
    payment_id: Option<PaymentId>,
    outputs: Vec<TxOutput>,
    rta_signatures: Vec<RtaSignature>,
}

impl Transaction {
    pub fn new(tx_type: TxType, payment_id: Option<PaymentId>, outputs: Vec<TxOutput>) -> Self {
        Transaction {
            version: TX_VERSION,
            tx_type,
            payment_id,
            outputs,
            rta_signatures: Vec::new(),
        }
    }

    pub fn tx_type(&self) -> TxType {
        self.tx_type
    }

    pub fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn rta_signatures(&self) -> &[RtaSignature] {
        &self.rta_signatures
    }

    /// Replace the rta signature section. Does not affect the id.
    pub fn set_rta_signatures(&mut self, signatures: Vec<RtaSignature>) {
        self.rta_signatures = signatures;
    }

    /// Sum of the outputs destined for the given identity key. This is the
    /// authorization fee the payer assigned to that supernode.
    pub fn fee_for(&self, key: &PublicKey) -> u64 {
        self.outputs
            .iter()
            .filter(|output| output.recipient == *key)
            .map(|output| output.amount)
            .sum()
    }

    fn write_canonical(&self, writer: &mut Writer) {
        writer.write_u8(self.version);
        self.tx_type.write(writer);
        self.payment_id.write(writer);
        writer.write_u8(self.outputs.len() as u8);
        for output in &self.outputs {
            output.write(writer);
        }
    }

    /// Canonical bytes: everything except the rta signature section.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        self.write_canonical(&mut writer);
        writer.into_bytes()
    }

    /// Transaction id: hash of the canonical form.
    pub fn id(&self) -> Hash {
        hash(&self.canonical_bytes())
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        self.write_canonical(writer);
        writer.write_u8(self.rta_signatures.len() as u8);
        for signature in &self.rta_signatures {
            signature.write(writer);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let version = reader.read_u8()?;
        if version != TX_VERSION {
            return Err(ReaderError::InvalidValue);
        }
        let tx_type = TxType::read(reader)?;
        let payment_id = Option::read(reader)?;

        let output_count = reader.read_u8()? as usize;
        if output_count == 0 {
            return Err(ReaderError::InvalidSize);
        }
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::read(reader)?);
        }

        let signature_count = reader.read_u8()? as usize;
        let mut rta_signatures = Vec::with_capacity(signature_count);
        for _ in 0..signature_count {
            rta_signatures.push(RtaSignature::read(reader)?);
        }

        Ok(Transaction {
            version,
            tx_type,
            payment_id,
            outputs,
            rta_signatures,
        })
    }

    fn size(&self) -> usize {
        1 + self.tx_type.size()
            + self.payment_id.size()
            + 1
            + self.outputs.iter().map(Serializer::size).sum::<usize>()
            + 1
            + self
                .rta_signatures
                .iter()
                .map(Serializer::size)
                .sum::<usize>()
    }
}
