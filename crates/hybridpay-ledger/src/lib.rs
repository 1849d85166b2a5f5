//! # hybridpay-ledger
//!
//! **Ledger Store**: one wallet per user, an append-only transaction log,
//! and the order/withdrawal records that must change atomically with it.
//!
//! ## Architecture
//!
//! 1. **LedgerStore**: committed state behind a single write lock, with
//!    owned-snapshot reads
//! 2. **UnitOfWork**: the scope handed to `LedgerStore::transaction`; stages
//!    writes and exposes the debit/credit primitives
//! 3. **KeyedLocks**: per-wallet-owner and per-order async locks held across
//!    collaborator calls
//! 4. **replay**: rebuilds each wallet's balances from its entries
//!
//! ## Write Flow
//!
//! ```text
//! wallet_locks.acquire(user) → [collaborator calls] →
//!     store.transaction(|uow| { uow.debit(..)?; uow.insert_order(..)?; .. })
//!         Ok  → staged writes applied together
//!         Err → nothing applied
//! ```

pub mod locks;
pub mod replay;
pub mod store;
pub mod unit_of_work;

pub use locks::{KeyedGuard, KeyedLocks};
pub use replay::verify_wallet_chain;
pub use store::LedgerStore;
pub use unit_of_work::UnitOfWork;
