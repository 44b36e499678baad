//! Chain events and the ledger event envelope.
//!
//! Chain events are what the escrow contract's logs say happened. Ledger
//! events are what the sync layer hands to downstream consumers; on the wire
//! they travel as a one-byte [`EventTag`] followed by a bincode payload.

use serde::{Deserialize, Serialize};

use crate::{BlockHeight, EnvelopeError, Nonce, TxId, WalletAddress};

/// A deposit into the escrow contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub tx_id: TxId,
    pub caller: WalletAddress,
    /// Base-10 raw amount exactly as logged; parsed by the ledger.
    pub amount: String,
    pub height: BlockHeight,
}

/// The contract paid out a previously requested withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalConfirmedEvent {
    pub tx_id: TxId,
    pub nonce: Nonce,
    pub receiver: WalletAddress,
    pub amount: String,
    pub height: BlockHeight,
}

/// A wallet asked to withdraw; originates off-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequestEvent {
    pub wallet: WalletAddress,
    pub amount: String,
    pub nonce: Nonce,
    pub expiration: BlockHeight,
}

/// Type tag prefixed to every encoded [`LedgerEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventTag {
    Deposit = 0x01,
    WithdrawalRequest = 0x02,
    WithdrawalConfirmation = 0x03,
    EndOfBlock = 0x04,
}

impl TryFrom<u8> for EventTag {
    type Error = EnvelopeError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0x01 => Ok(Self::Deposit),
            0x02 => Ok(Self::WithdrawalRequest),
            0x03 => Ok(Self::WithdrawalConfirmation),
            0x04 => Ok(Self::EndOfBlock),
            other => Err(EnvelopeError::UnknownTag(other)),
        }
    }
}

/// Events fanned out to ledger consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    Deposit(DepositEvent),
    WithdrawalRequest(WithdrawalRequestEvent),
    WithdrawalConfirmation(WithdrawalConfirmedEvent),
    /// Every event at or below this height has been delivered.
    EndOfBlock(BlockHeight),
}

impl LedgerEvent {
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Deposit(_) => EventTag::Deposit,
            Self::WithdrawalRequest(_) => EventTag::WithdrawalRequest,
            Self::WithdrawalConfirmation(_) => EventTag::WithdrawalConfirmation,
            Self::EndOfBlock(_) => EventTag::EndOfBlock,
        }
    }

    /// The address whose partition must carry this event, or `None` for
    /// events every partition needs to see.
    pub fn partition_key(&self) -> Option<&WalletAddress> {
        match self {
            Self::Deposit(e) => Some(&e.caller),
            Self::WithdrawalRequest(e) => Some(&e.wallet),
            Self::WithdrawalConfirmation(e) => Some(&e.receiver),
            Self::EndOfBlock(_) => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let payload = match self {
            Self::Deposit(e) => bincode::serialize(e)?,
            Self::WithdrawalRequest(e) => bincode::serialize(e)?,
            Self::WithdrawalConfirmation(e) => bincode::serialize(e)?,
            Self::EndOfBlock(h) => bincode::serialize(h)?,
        };
        let mut out = Vec::with_capacity(payload.len() + 1);
        out.push(self.tag() as u8);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let (&tag, payload) = bytes.split_first().ok_or(EnvelopeError::Empty)?;
        let event = match EventTag::try_from(tag)? {
            EventTag::Deposit => Self::Deposit(bincode::deserialize(payload)?),
            EventTag::WithdrawalRequest => Self::WithdrawalRequest(bincode::deserialize(payload)?),
            EventTag::WithdrawalConfirmation => {
                Self::WithdrawalConfirmation(bincode::deserialize(payload)?)
            }
            EventTag::EndOfBlock => Self::EndOfBlock(bincode::deserialize(payload)?),
        };
        Ok(event)
    }
}
