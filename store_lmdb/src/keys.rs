//! Key layout of the `ledger` database.
//!
//! Every key starts with a one-byte namespace prefix. Heights are encoded as
//! big-endian u64 so that lexicographic key order equals numeric order, which
//! turns "everything up to height H" into a single range scan.
//!
//! | prefix | key suffix                  | value                        |
//! |--------|-----------------------------|------------------------------|
//! | `0x00` | `"schema_version"`          | u32 LE                       |
//! | `0x01` | address                     | u128 BE deposit balance      |
//! | `0x02` | address                     | u128 BE spent balance        |
//! | `0x03` | expiration BE ++ nonce      | bincode `PendingWithdrawal`  |
//! | `0x04` | nonce                       | expiration BE                |
//! | `0x05` | height BE ++ tx id          | empty                        |
//! | `0x06` | (none)                      | next height BE               |

use escrow_types::{BlockHeight, Nonce, TxId, WalletAddress};

use crate::LmdbError;

pub const META: u8 = 0x00;
pub const DEPOSIT_BALANCE: u8 = 0x01;
pub const SPENT_BALANCE: u8 = 0x02;
pub const PENDING_WITHDRAWAL: u8 = 0x03;
pub const WITHDRAWAL_NONCE: u8 = 0x04;
pub const BLOCK_TX_MARKER: u8 = 0x05;
pub const LAST_PROCESSED_HEIGHT: u8 = 0x06;

fn prefixed(prefix: u8, suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + suffix.len());
    key.push(prefix);
    key.extend_from_slice(suffix);
    key
}

pub fn schema_version_key() -> Vec<u8> {
    prefixed(META, b"schema_version")
}

pub fn balance_key(address: &WalletAddress) -> Vec<u8> {
    prefixed(DEPOSIT_BALANCE, address.as_bytes())
}

pub fn spent_key(address: &WalletAddress) -> Vec<u8> {
    prefixed(SPENT_BALANCE, address.as_bytes())
}

pub fn withdrawal_key(expiration: BlockHeight, nonce: &Nonce) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + nonce.as_bytes().len());
    key.push(PENDING_WITHDRAWAL);
    key.extend_from_slice(&expiration.to_be_bytes());
    key.extend_from_slice(nonce.as_bytes());
    key
}

pub fn nonce_key(nonce: &Nonce) -> Vec<u8> {
    prefixed(WITHDRAWAL_NONCE, nonce.as_bytes())
}

pub fn marker_key(height: BlockHeight, tx_id: &TxId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + tx_id.as_bytes().len());
    key.push(BLOCK_TX_MARKER);
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(tx_id.as_bytes());
    key
}

pub fn cursor_key() -> [u8; 1] {
    [LAST_PROCESSED_HEIGHT]
}

/// Exclusive upper bound covering every key in `prefix`'s namespace whose
/// big-endian height component is `<= height`.
pub fn height_upper_bound(prefix: u8, height: BlockHeight) -> Vec<u8> {
    match height.checked_add(1) {
        Some(next) => prefixed(prefix, &next.to_be_bytes()),
        None => {
            let mut upper = vec![prefix];
            increment_prefix(&mut upper);
            upper
        }
    }
}

/// Exclusive upper bound of the whole namespace.
pub fn namespace_upper_bound(prefix: u8) -> Vec<u8> {
    let mut upper = vec![prefix];
    increment_prefix(&mut upper);
    upper
}

/// Increment a byte string to the smallest value greater than every string
/// it prefixes.
pub fn increment_prefix(prefix: &mut Vec<u8>) {
    while let Some(last) = prefix.last_mut() {
        if *last < 0xff {
            *last += 1;
            return;
        }
        prefix.pop();
    }
}

/// Recover the nonce from a `PENDING_WITHDRAWAL` key.
pub fn nonce_from_withdrawal_key(key: &[u8]) -> Result<Nonce, LmdbError> {
    let suffix = key
        .get(9..)
        .ok_or_else(|| LmdbError::Corruption("short withdrawal key".into()))?;
    let nonce = std::str::from_utf8(suffix)
        .map_err(|_| LmdbError::Corruption("withdrawal nonce is not utf-8".into()))?;
    Ok(Nonce::new(nonce))
}

/// Recover the address from a balance or spent key.
pub fn address_from_key(key: &[u8]) -> Result<WalletAddress, LmdbError> {
    let suffix = key
        .get(1..)
        .ok_or_else(|| LmdbError::Corruption("empty balance key".into()))?;
    let address = std::str::from_utf8(suffix)
        .map_err(|_| LmdbError::Corruption("address is not utf-8".into()))?;
    Ok(WalletAddress::new(address))
}

pub fn decode_height(bytes: &[u8]) -> Result<BlockHeight, LmdbError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("height has {} bytes", bytes.len())))?;
    Ok(BlockHeight::from_be_bytes(arr))
}
