//! The ledger store.
//!
//! Holds wallets, the append-only transaction log, orders, timelines,
//! withdrawals and the account/listing records the settlement core reads.
//! All writes go through [`LedgerStore::transaction`]; reads return owned
//! snapshots so no lock is held by callers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hybridpay_types::{
    BehaviorHistory, HybridPayError, Listing, ListingId, Notification, Order, OrderId,
    OrderNumber, OrderStatus, OrderTimelineEntry, Result, TimelineEvent, TransactionType,
    UserAccount, UserId, Wallet, WalletId, WalletSummary, WalletTransaction, Withdrawal,
    WithdrawalId, WithdrawalStatus,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::locks::KeyedLocks;
use crate::replay::verify_wallet_chain;
use crate::unit_of_work::{LedgerState, UnitOfWork};

/// In-memory transactional store.
///
/// Store transactions are serialized by a single write lock and never span
/// an `.await`. Work that must hold a wallet or order across collaborator
/// calls takes the matching keyed lock first.
pub struct LedgerStore {
    state: RwLock<LedgerState>,
    wallet_locks: KeyedLocks<UserId>,
    order_locks: KeyedLocks<OrderId>,
}

impl LedgerStore {
    /// Create an empty store whose keyed locks time out after `lock_timeout`.
    #[must_use]
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            wallet_locks: KeyedLocks::new("wallet", lock_timeout),
            order_locks: KeyedLocks::new("order", lock_timeout),
        }
    }

    /// Per-wallet-owner locks.
    #[must_use]
    pub fn wallet_locks(&self) -> &KeyedLocks<UserId> {
        &self.wallet_locks
    }

    /// Per-order locks.
    #[must_use]
    pub fn order_locks(&self) -> &KeyedLocks<OrderId> {
        &self.order_locks
    }

    /// Run `f` as one atomic unit of work stamped with the current time.
    ///
    /// # Errors
    /// Whatever `f` returns. On error nothing `f` staged is applied.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T>) -> Result<T> {
        self.transaction_at(Utc::now(), f)
    }

    /// Like [`Self::transaction`] with an explicit timestamp.
    pub fn transaction_at<T>(
        &self,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.write();
        let (result, staged) = {
            let mut uow = UnitOfWork::new(&state, now);
            let result = f(&mut uow);
            (result, uow.into_staged())
        };
        match result {
            Ok(value) => {
                tracing::trace!(entries = staged.transaction_count(), "unit of work committed");
                state.apply(staged);
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(error = %err, "unit of work rolled back");
                Err(err)
            }
        }
    }

    // =================================================================
    // Records owned by outer layers
    // =================================================================

    /// Insert or replace an account record (identity and onboarding are
    /// managed outside this core).
    pub fn put_user(&self, user: UserAccount) {
        let mut state = self.state.write();
        if let Some(account) = &user.payout_account {
            state
                .payout_owners
                .insert(account.account_ref.clone(), user.id);
        }
        state.users.insert(user.id, user);
    }

    /// Insert or replace a catalog listing.
    pub fn put_listing(&self, listing: Listing) {
        self.state.write().listings.insert(listing.id, listing);
    }

    /// Credit external funds to a user's wallet as a `DEPOSIT`.
    ///
    /// # Errors
    /// `Validation` for a non-positive or sub-cent amount.
    pub fn deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        reference: Option<String>,
    ) -> Result<WalletTransaction> {
        let tx = self.transaction(|uow| {
            let wallet = uow.ensure_wallet(user_id);
            uow.credit(wallet.id, amount, TransactionType::Deposit, reference, None)
        })?;
        tracing::info!(%user_id, %amount, balance = %tx.balance_after, "deposit credited");
        Ok(tx)
    }

    // =================================================================
    // Reads
    // =================================================================

    #[must_use]
    pub fn user(&self, id: UserId) -> Option<UserAccount> {
        self.state.read().users.get(&id).cloned()
    }

    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<Listing> {
        self.state.read().listings.get(&id).cloned()
    }

    #[must_use]
    pub fn wallet(&self, id: WalletId) -> Option<Wallet> {
        self.state.read().wallets.get(&id).cloned()
    }

    #[must_use]
    pub fn wallet_for_user(&self, user_id: UserId) -> Option<Wallet> {
        let state = self.state.read();
        state
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned()
    }

    /// All entries of a wallet, oldest first.
    #[must_use]
    pub fn wallet_transactions(&self, wallet_id: WalletId) -> Vec<WalletTransaction> {
        let state = self.state.read();
        state
            .tx_by_wallet
            .get(&wallet_id)
            .map(|idxs| idxs.iter().map(|&i| state.transactions[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Balances plus the `limit` newest entries. A user without a wallet
    /// gets a zero summary; no wallet is created by reading.
    #[must_use]
    pub fn wallet_summary(&self, user_id: UserId, limit: usize) -> WalletSummary {
        let state = self.state.read();
        let Some(wallet) = state
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| state.wallets.get(id))
        else {
            return WalletSummary {
                user_id,
                balance: Decimal::ZERO,
                pending_balance: Decimal::ZERO,
                recent_transactions: Vec::new(),
            };
        };
        let recent_transactions = state
            .tx_by_wallet
            .get(&wallet.id)
            .map(|idxs| {
                idxs.iter()
                    .rev()
                    .take(limit)
                    .map(|&i| state.transactions[i].clone())
                    .collect()
            })
            .unwrap_or_default();
        WalletSummary {
            user_id,
            balance: wallet.balance,
            pending_balance: wallet.pending_balance,
            recent_transactions,
        }
    }

    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.read().orders.get(&id).cloned()
    }

    #[must_use]
    pub fn order_by_number(&self, number: &OrderNumber) -> Option<Order> {
        let state = self.state.read();
        state
            .order_by_number
            .get(number)
            .and_then(|id| state.orders.get(id))
            .cloned()
    }

    #[must_use]
    pub fn order_by_payment_ref(&self, reference: &str) -> Option<Order> {
        let state = self.state.read();
        state
            .order_by_payment_ref
            .get(reference)
            .and_then(|id| state.orders.get(id))
            .cloned()
    }

    /// Number of orders in the store.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }

    /// Audit trail of an order, oldest first.
    #[must_use]
    pub fn timeline(&self, order_id: OrderId) -> Vec<OrderTimelineEntry> {
        self.state
            .read()
            .timeline
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn notifications(&self, user_id: UserId) -> Vec<Notification> {
        self.state
            .read()
            .notifications
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn withdrawal(&self, id: WithdrawalId) -> Option<Withdrawal> {
        self.state.read().withdrawals.get(&id).cloned()
    }

    /// A user's withdrawals, oldest first.
    #[must_use]
    pub fn withdrawals_for_user(&self, user_id: UserId) -> Vec<Withdrawal> {
        let mut out: Vec<Withdrawal> = self
            .state
            .read()
            .withdrawals
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|w| (w.created_at, w.id));
        out
    }

    /// The manual-review queue, oldest first.
    #[must_use]
    pub fn pending_withdrawals(&self) -> Vec<Withdrawal> {
        let mut out: Vec<Withdrawal> = self
            .state
            .read()
            .withdrawals
            .values()
            .filter(|w| w.status == WithdrawalStatus::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|w| (w.created_at, w.id));
        out
    }

    /// Ids of PENDING orders created before `cutoff`.
    #[must_use]
    pub fn unpaid_orders_created_before(&self, cutoff: DateTime<Utc>) -> Vec<OrderId> {
        let mut out: Vec<(DateTime<Utc>, OrderId)> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < cutoff)
            .map(|o| (o.created_at, o.id))
            .collect();
        out.sort();
        out.into_iter().map(|(_, id)| id).collect()
    }

    /// Ids of DELIVERED orders marked delivered before `cutoff`.
    #[must_use]
    pub fn delivered_orders_before(&self, cutoff: DateTime<Utc>) -> Vec<OrderId> {
        let mut out: Vec<(DateTime<Utc>, OrderId)> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Delivered)
            .filter_map(|o| o.delivered_at.filter(|at| *at < cutoff).map(|at| (at, o.id)))
            .collect();
        out.sort();
        out.into_iter().map(|(_, id)| id).collect()
    }

    /// Marketplace history of `user_id` for fraud scoring.
    ///
    /// # Errors
    /// `UserNotFound` if no account record exists.
    pub fn behavior_history(&self, user_id: UserId) -> Result<BehaviorHistory> {
        let state = self.state.read();
        let user = state
            .users
            .get(&user_id)
            .ok_or(HybridPayError::UserNotFound(user_id))?;

        let mut history = BehaviorHistory {
            reputation: user.reputation,
            ..BehaviorHistory::default()
        };
        for order in state.orders.values() {
            if order.buyer_id == user_id {
                history.orders_as_buyer += 1;
            }
            if order.seller_id == user_id {
                history.orders_as_seller += 1;
                if order.status == OrderStatus::Completed {
                    history.completed_sales += 1;
                }
            }
            if order.is_party(user_id) {
                let disputed = state.timeline.get(&order.id).is_some_and(|entries| {
                    entries
                        .iter()
                        .any(|e| e.event == TimelineEvent::DisputeOpened)
                });
                if disputed {
                    history.disputes += 1;
                }
            }
        }
        history.previous_withdrawals = u32::try_from(
            state
                .withdrawals
                .values()
                .filter(|w| w.user_id == user_id)
                .count(),
        )
        .unwrap_or(u32::MAX);
        Ok(history)
    }

    // =================================================================
    // Audit
    // =================================================================

    /// Replay a wallet's history against its balances.
    ///
    /// # Errors
    /// `WalletNotFound` or `LedgerInvariantViolation`.
    pub fn verify_wallet_history(&self, wallet_id: WalletId) -> Result<()> {
        let wallet = self
            .wallet(wallet_id)
            .ok_or(HybridPayError::WalletNotFound(wallet_id))?;
        verify_wallet_chain(&wallet, &self.wallet_transactions(wallet_id))
    }

    /// Replay every wallet. Returns the number of wallets checked.
    ///
    /// # Errors
    /// The first `LedgerInvariantViolation` found.
    pub fn verify_all_wallets(&self) -> Result<usize> {
        let state = self.state.read();
        for wallet in state.wallets.values() {
            let entries: Vec<WalletTransaction> = state
                .tx_by_wallet
                .get(&wallet.id)
                .map(|idxs| idxs.iter().map(|&i| state.transactions[i].clone()).collect())
                .unwrap_or_default();
            verify_wallet_chain(wallet, &entries)?;
        }
        Ok(state.wallets.len())
    }
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new(Duration::from_millis(
            hybridpay_types::constants::DEFAULT_LOCK_TIMEOUT_MS,
        ))
    }
}

#[cfg(test)]
mod tests {
    use hybridpay_types::{LedgerBucket, NotificationKind};
    use rust_decimal_macros::dec;

    use super::*;

    fn funded(store: &LedgerStore, amount: Decimal) -> UserId {
        let user = UserId::new();
        store.put_user(UserAccount::new(user, Utc::now()));
        store.deposit(user, amount, None).unwrap();
        user
    }

    #[test]
    fn ensure_wallet_is_idempotent() {
        let store = LedgerStore::default();
        let user = UserId::new();
        let a = store.transaction(|uow| Ok(uow.ensure_wallet(user))).unwrap();
        let b = store.transaction(|uow| Ok(uow.ensure_wallet(user))).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.balance, Decimal::ZERO);
        assert_eq!(store.wallet_for_user(user).unwrap().id, a.id);
    }

    #[test]
    fn credit_and_debit_snapshot_balances() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(100.00));
        let wallet = store.wallet_for_user(user).unwrap();

        let tx = store
            .transaction(|uow| {
                uow.debit(
                    wallet.id,
                    dec!(40.00),
                    TransactionType::Purchase,
                    Some("HP-1".into()),
                    None,
                )
            })
            .unwrap();
        assert_eq!(tx.amount, dec!(-40.00));
        assert_eq!(tx.balance_before, dec!(100.00));
        assert_eq!(tx.balance_after, dec!(60.00));
        assert_eq!(store.wallet(wallet.id).unwrap().balance, dec!(60.00));
        store.verify_wallet_history(wallet.id).unwrap();
    }

    #[test]
    fn overdraft_fails_and_leaves_balance() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(10.00));
        let wallet = store.wallet_for_user(user).unwrap();

        let err = store
            .transaction(|uow| {
                uow.debit(wallet.id, dec!(10.01), TransactionType::Purchase, None, None)
            })
            .unwrap_err();
        assert!(matches!(err, HybridPayError::InsufficientBalance { .. }));
        assert_eq!(store.wallet(wallet.id).unwrap().balance, dec!(10.00));
        assert_eq!(store.wallet_transactions(wallet.id).len(), 1);
    }

    #[test]
    fn failed_scope_rolls_back_every_write() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(50.00));
        let wallet = store.wallet_for_user(user).unwrap();

        let result: Result<()> = store.transaction(|uow| {
            uow.debit(wallet.id, dec!(20.00), TransactionType::Purchase, None, None)?;
            uow.notify(user, NotificationKind::NewOrder, "t", "m", None);
            Err(HybridPayError::Internal("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.wallet(wallet.id).unwrap().balance, dec!(50.00));
        assert_eq!(store.wallet_transactions(wallet.id).len(), 1);
        assert!(store.notifications(user).is_empty());
    }

    #[test]
    fn reads_see_own_writes() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(30.00));
        let wallet = store.wallet_for_user(user).unwrap();

        store
            .transaction(|uow| {
                uow.debit(wallet.id, dec!(20.00), TransactionType::Purchase, None, None)?;
                assert_eq!(uow.require_wallet(wallet.id)?.balance, dec!(10.00));
                let err = uow
                    .debit(wallet.id, dec!(20.00), TransactionType::Purchase, None, None)
                    .unwrap_err();
                assert!(matches!(err, HybridPayError::InsufficientBalance { .. }));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.wallet(wallet.id).unwrap().balance, dec!(10.00));
    }

    #[test]
    fn release_pending_moves_between_buckets() {
        let store = LedgerStore::default();
        let seller = UserId::new();
        let wallet = store
            .transaction(|uow| {
                let w = uow.ensure_wallet(seller);
                uow.credit_pending(w.id, dec!(90.00), TransactionType::Sale, None, None)?;
                Ok(w)
            })
            .unwrap();

        let [out, into] = store
            .transaction(|uow| uow.release_pending(wallet.id, dec!(90.00), Some("HP-2".into())))
            .unwrap();
        assert_eq!(out.bucket, LedgerBucket::Pending);
        assert_eq!(out.amount, dec!(-90.00));
        assert_eq!(into.bucket, LedgerBucket::Available);
        assert_eq!(into.balance_after, dec!(90.00));

        let w = store.wallet(wallet.id).unwrap();
        assert_eq!(w.balance, dec!(90.00));
        assert_eq!(w.pending_balance, Decimal::ZERO);
        store.verify_wallet_history(wallet.id).unwrap();
    }

    #[test]
    fn release_more_than_pending_fails() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(5.00));
        let wallet = store.wallet_for_user(user).unwrap();
        let err = store
            .transaction(|uow| uow.release_pending(wallet.id, dec!(1.00), None))
            .unwrap_err();
        assert!(matches!(err, HybridPayError::InsufficientPending { .. }));
    }

    #[test]
    fn amounts_must_be_positive_cents() {
        let store = LedgerStore::default();
        let user = UserId::new();
        for amount in [dec!(0), dec!(-1), dec!(1.001)] {
            let err = store.deposit(user, amount, None).unwrap_err();
            assert!(matches!(err, HybridPayError::Validation { .. }), "{amount}");
        }
    }

    #[test]
    fn summary_lists_newest_first() {
        let store = LedgerStore::default();
        let user = funded(&store, dec!(10.00));
        store.deposit(user, dec!(5.00), Some("second".into())).unwrap();
        store.deposit(user, dec!(1.00), Some("third".into())).unwrap();

        let summary = store.wallet_summary(user, 2);
        assert_eq!(summary.balance, dec!(16.00));
        assert_eq!(summary.recent_transactions.len(), 2);
        assert_eq!(summary.recent_transactions[0].reference.as_deref(), Some("third"));
        assert_eq!(summary.recent_transactions[1].reference.as_deref(), Some("second"));

        let empty = store.wallet_summary(UserId::new(), 20);
        assert_eq!(empty.balance, Decimal::ZERO);
        assert!(empty.recent_transactions.is_empty());
    }

    #[test]
    fn sequences_are_store_wide_and_increasing() {
        let store = LedgerStore::default();
        let a = funded(&store, dec!(1.00));
        let b = funded(&store, dec!(2.00));
        let ta = store.wallet_transactions(store.wallet_for_user(a).unwrap().id);
        let tb = store.wallet_transactions(store.wallet_for_user(b).unwrap().id);
        assert!(ta[0].sequence < tb[0].sequence);
        assert_eq!(store.verify_all_wallets().unwrap(), 2);
    }

    #[test]
    fn order_payment_ref_index() {
        let store = LedgerStore::default();
        let mut order = Order::dummy(UserId::new(), UserId::new(), dec!(10.00));
        let id = order.id;
        store
            .transaction(|uow| {
                uow.insert_order(order.clone())?;
                Ok(())
            })
            .unwrap();
        assert!(store.order_by_payment_ref("pi_1").is_none());

        store
            .transaction(|uow| {
                uow.order_mut(id)?.payment_reference = Some("pi_1".into());
                assert_eq!(uow.order_by_payment_ref("pi_1").map(|o| o.id), Some(id));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.order_by_payment_ref("pi_1").unwrap().id, id);

        order.id = OrderId::new();
        let err = store
            .transaction(|uow| uow.insert_order(order.clone()))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn expiry_queries() {
        let store = LedgerStore::default();
        let now = Utc::now();
        let mut old = Order::dummy(UserId::new(), UserId::new(), dec!(10.00));
        old.created_at = now - chrono::Duration::hours(3);
        let fresh = Order::dummy(UserId::new(), UserId::new(), dec!(10.00));
        let old_id = old.id;
        store
            .transaction(|uow| {
                uow.insert_order(old)?;
                uow.insert_order(fresh)
            })
            .unwrap();
        let due = store.unpaid_orders_created_before(now - chrono::Duration::hours(1));
        assert_eq!(due, vec![old_id]);
        assert!(store.delivered_orders_before(now).is_empty());
    }
}
