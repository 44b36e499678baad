//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use escrow_types::{AccountBalance, Amount, WalletAddress};

use crate::keys;
use crate::LmdbError;

/// Current on-disk layout version, stored under [`keys::schema_version_key`].
pub const SCHEMA_VERSION: u32 = 1;

const MAX_DBS: u32 = 1;
const LEDGER_DB: &str = "ledger";

/// Wraps the LMDB environment and the ledger database handle.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    ledger_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    ///
    /// The directory is created if missing. A fresh database is stamped with
    /// [`SCHEMA_VERSION`]; an existing one must carry the same version.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per path by this process and
        // never memory-mapped by anything else while open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let schema_key = keys::schema_version_key();
        let mut wtxn = env.write_txn()?;
        let ledger_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(LEDGER_DB))?;
        let stored = ledger_db
            .get(&wtxn, schema_key.as_slice())?
            .map(|b| b.to_vec());
        match stored {
            None => {
                ledger_db.put(&mut wtxn, schema_key.as_slice(), &SCHEMA_VERSION.to_le_bytes())?;
                tracing::info!(path = %path.display(), version = SCHEMA_VERSION, "initialised ledger database");
            }
            Some(bytes) => {
                let version = <[u8; 4]>::try_from(bytes.as_slice())
                    .map(u32::from_le_bytes)
                    .map_err(|_| {
                        LmdbError::Corruption("schema_version has unexpected byte length".into())
                    })?;
                if version != SCHEMA_VERSION {
                    return Err(LmdbError::Corruption(format!(
                        "unsupported schema version {version}, expected {SCHEMA_VERSION}"
                    )));
                }
            }
        }
        wtxn.commit()?;

        Ok(Self {
            env: Arc::new(env),
            ledger_db,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// A ledger store sharing this environment.
    pub fn ledger_store(&self) -> LmdbLedgerStore {
        LmdbLedgerStore {
            env: Arc::clone(&self.env),
            db: self.ledger_db,
        }
    }
}

/// LMDB-backed implementation of every `escrow-store` trait.
///
/// Cheap to clone; clones share the environment.
#[derive(Clone)]
pub struct LmdbLedgerStore {
    pub(crate) env: Arc<Env>,
    pub(crate) db: Database<Bytes, Bytes>,
}

impl LmdbLedgerStore {
    pub(crate) fn read_amount(&self, txn: &RoTxn, key: &[u8]) -> Result<Amount, LmdbError> {
        match self.db.get(txn, key)? {
            None => Ok(Amount::ZERO),
            Some(bytes) => decode_amount(bytes),
        }
    }

    /// Zero amounts are deleted rather than stored.
    pub(crate) fn write_amount(
        &self,
        txn: &mut RwTxn,
        key: &[u8],
        amount: Amount,
    ) -> Result<(), LmdbError> {
        if amount.is_zero() {
            self.db.delete(txn, key)?;
        } else {
            self.db.put(txn, key, &amount.to_be_bytes())?;
        }
        Ok(())
    }

    pub(crate) fn read_account(
        &self,
        txn: &RoTxn,
        address: &WalletAddress,
    ) -> Result<AccountBalance, LmdbError> {
        Ok(AccountBalance {
            balance: self.read_amount(txn, &keys::balance_key(address))?,
            spent: self.read_amount(txn, &keys::spent_key(address))?,
        })
    }

    pub(crate) fn write_account(
        &self,
        txn: &mut RwTxn,
        address: &WalletAddress,
        account: &AccountBalance,
    ) -> Result<(), LmdbError> {
        self.write_amount(txn, &keys::balance_key(address), account.balance)?;
        self.write_amount(txn, &keys::spent_key(address), account.spent)
    }
}

pub(crate) fn decode_amount(bytes: &[u8]) -> Result<Amount, LmdbError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("amount has {} bytes", bytes.len())))?;
    Ok(Amount::from_be_bytes(arr))
}
