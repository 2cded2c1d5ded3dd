//! Payment identifiers and the RTA payment lifecycle statuses.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use rand::{rngs::OsRng, RngCore};
use serde::{de::Error as SerdeError, Deserialize, Serialize};

use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const PAYMENT_ID_SIZE: usize = 16; // 16 bytes / 128 bits

/// Opaque identifier of an end-to-end payment, assigned by the point of sale.
/// Conveyed as lowercase hex on the wire.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct PaymentId([u8; PAYMENT_ID_SIZE]);

impl PaymentId {
    pub const fn new(bytes: [u8; PAYMENT_ID_SIZE]) -> Self {
        PaymentId(bytes)
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; PAYMENT_ID_SIZE];
        OsRng.fill_bytes(&mut bytes);
        PaymentId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAYMENT_ID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PaymentId {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != PAYMENT_ID_SIZE * 2 {
            return Err(ReaderError::InvalidSize);
        }
        let bytes = hex::decode(s)?;
        let bytes: [u8; PAYMENT_ID_SIZE] =
            bytes.try_into().map_err(|_| ReaderError::InvalidSize)?;
        Ok(PaymentId(bytes))
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PaymentId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PaymentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex = String::deserialize(deserializer)?;
        hex.parse().map_err(SerdeError::custom)
    }
}

impl Serializer for PaymentId {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(PaymentId::new(reader.read_bytes()?))
    }

    fn size(&self) -> usize {
        PAYMENT_ID_SIZE
    }
}

/// Lifecycle status of a payment. Conveyed as an integer on the wire.
///
/// Discriminant 1 is intentionally unassigned, kept for compatibility with
/// earlier protocol revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RtaStatus {
    None,
    InProgress,
    Success,
    // rejected by the point of sale / auth sample vote
    FailRejectedByPos,
    // rejected by the auth sample due to low or zero fee
    FailZeroFee,
    // rejected by the auth sample due to a double spend
    FailDoubleSpend,
    FailTimedOut,
    // tx rejected by the ledger
    FailTxRejected,
}

impl RtaStatus {
    /// A finite status is terminal: no further transition is possible and any
    /// later write to the same payment must be dropped.
    pub fn is_finite(self) -> bool {
        !matches!(self, RtaStatus::None | RtaStatus::InProgress)
    }
}

impl From<RtaStatus> for u8 {
    fn from(status: RtaStatus) -> u8 {
        match status {
            RtaStatus::None => 0,
            RtaStatus::InProgress => 2,
            RtaStatus::Success => 3,
            RtaStatus::FailRejectedByPos => 4,
            RtaStatus::FailZeroFee => 5,
            RtaStatus::FailDoubleSpend => 6,
            RtaStatus::FailTimedOut => 7,
            RtaStatus::FailTxRejected => 8,
        }
    }
}

impl TryFrom<u8> for RtaStatus {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => RtaStatus::None,
            2 => RtaStatus::InProgress,
            3 => RtaStatus::Success,
            4 => RtaStatus::FailRejectedByPos,
            5 => RtaStatus::FailZeroFee,
            6 => RtaStatus::FailDoubleSpend,
            7 => RtaStatus::FailTimedOut,
            8 => RtaStatus::FailTxRejected,
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Display for RtaStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Result of a single supernode's RTA verification of one transaction.
/// Conveyed as an integer on the wire; `Invalid` marks a vote that failed
/// parsing or validation and never counts toward any quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum VoteResult {
    Approved,
    Rejected,
    Invalid,
}

impl From<VoteResult> for u8 {
    fn from(result: VoteResult) -> u8 {
        match result {
            VoteResult::Approved => 0,
            VoteResult::Rejected => 1,
            VoteResult::Invalid => 3,
        }
    }
}

impl TryFrom<u8> for VoteResult {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => VoteResult::Approved,
            1 => VoteResult::Rejected,
            3 => VoteResult::Invalid,
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Display for VoteResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}
