//! Partitioned event publisher.
//!
//! Encodes [`LedgerEvent`]s into tagged envelopes and routes them over `N`
//! ordered channels. Address-scoped events go to the partition chosen by a
//! hash of the address, so every event for one address is seen in order by
//! one consumer. End-of-block markers go to every partition.

use async_trait::async_trait;
use tokio::sync::mpsc;

use escrow_types::{
    BlockHeight, DepositEvent, LedgerEvent, WalletAddress, WithdrawalConfirmedEvent,
    WithdrawalRequestEvent,
};

use crate::{LedgerSink, SinkError};

pub struct EventPublisher {
    partitions: Vec<mpsc::Sender<Vec<u8>>>,
}

impl EventPublisher {
    /// Create a publisher with `partitions` channels of capacity `buffer`,
    /// returning the consumer ends in partition order.
    pub fn new(partitions: usize, buffer: usize) -> (Self, Vec<mpsc::Receiver<Vec<u8>>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..partitions.max(1))
            .map(|_| mpsc::channel(buffer.max(1)))
            .unzip();
        (
            Self {
                partitions: senders,
            },
            receivers,
        )
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition that carries events for `address`.
    pub fn partition_for(&self, address: &WalletAddress) -> usize {
        (fnv1a(address.as_bytes()) % self.partitions.len() as u64) as usize
    }

    pub async fn publish(&self, event: &LedgerEvent) -> Result<(), SinkError> {
        let bytes = event.encode()?;
        match event.partition_key() {
            Some(address) => self.send(self.partition_for(address), bytes).await,
            None => {
                for index in 0..self.partitions.len() {
                    self.send(index, bytes.clone()).await?;
                }
                Ok(())
            }
        }
    }

    /// Publish an off-chain withdrawal request.
    pub async fn publish_withdrawal_request(
        &self,
        event: &WithdrawalRequestEvent,
    ) -> Result<(), SinkError> {
        self.publish(&LedgerEvent::WithdrawalRequest(event.clone()))
            .await
    }

    async fn send(&self, index: usize, bytes: Vec<u8>) -> Result<(), SinkError> {
        self.partitions[index]
            .send(bytes)
            .await
            .map_err(|_| SinkError::PartitionClosed(index))
    }
}

#[async_trait]
impl LedgerSink for EventPublisher {
    async fn deposit(&self, event: &DepositEvent) -> Result<(), SinkError> {
        self.publish(&LedgerEvent::Deposit(event.clone())).await
    }

    async fn withdrawal_confirmed(
        &self,
        event: &WithdrawalConfirmedEvent,
    ) -> Result<(), SinkError> {
        self.publish(&LedgerEvent::WithdrawalConfirmation(event.clone()))
            .await
    }

    async fn finalize_block(&self, height: BlockHeight) -> Result<(), SinkError> {
        self.publish(&LedgerEvent::EndOfBlock(height)).await
    }
}

/// 64-bit FNV-1a. Partition assignment must not change between releases,
/// which rules out `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_types::{EventTag, TxId};

    fn deposit(caller: &str) -> DepositEvent {
        DepositEvent {
            tx_id: TxId::new("0x1"),
            caller: WalletAddress::new(caller),
            amount: "5".into(),
            height: 1,
        }
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[tokio::test]
    async fn address_events_stay_on_one_partition() {
        let (publisher, mut receivers) = EventPublisher::new(4, 16);
        let index = publisher.partition_for(&WalletAddress::new("0xabc"));

        publisher.deposit(&deposit("0xabc")).await.unwrap();
        publisher.deposit(&deposit("0xabc")).await.unwrap();

        for (i, rx) in receivers.iter_mut().enumerate() {
            let expected = if i == index { 2 } else { 0 };
            let mut got = 0;
            while let Ok(bytes) = rx.try_recv() {
                assert_eq!(bytes[0], EventTag::Deposit as u8);
                got += 1;
            }
            assert_eq!(got, expected, "partition {i}");
        }
    }

    #[tokio::test]
    async fn end_of_block_reaches_every_partition() {
        let (publisher, mut receivers) = EventPublisher::new(3, 4);
        publisher.finalize_block(42).await.unwrap();
        for rx in &mut receivers {
            let bytes = rx.try_recv().unwrap();
            assert_eq!(LedgerEvent::decode(&bytes).unwrap(), LedgerEvent::EndOfBlock(42));
        }
    }

    #[tokio::test]
    async fn closed_partition_is_reported() {
        let (publisher, receivers) = EventPublisher::new(1, 1);
        drop(receivers);
        let err = publisher.finalize_block(1).await.unwrap_err();
        assert!(matches!(err, SinkError::PartitionClosed(0)));
        assert!(!err.is_rejection());
    }
}
