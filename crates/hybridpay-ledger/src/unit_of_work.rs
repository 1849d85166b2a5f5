//! Transaction scope over the ledger store.
//!
//! A [`UnitOfWork`] reads through to the committed state and stages every
//! write. [`LedgerStore::transaction`](crate::LedgerStore::transaction)
//! applies the staged writes only when the closure returns `Ok`, so ledger
//! entries, orders, and withdrawals written in one scope commit or vanish
//! together.
//!
//! The debit/credit primitives are the only way a balance changes, and each
//! one appends a [`WalletTransaction`] carrying the before/after snapshot
//! taken from the same staged wallet it mutates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hybridpay_types::money::is_cent_precise;
use hybridpay_types::{
    HybridPayError, LedgerBucket, Listing, ListingId, Notification, NotificationKind, Order,
    OrderId, OrderNumber, OrderTimelineEntry, Result, TimelineEvent, TransactionId,
    TransactionType, UserAccount, UserId, Wallet, WalletId, WalletTransaction, Withdrawal,
    WithdrawalId,
};
use rust_decimal::Decimal;

/// Committed store contents plus secondary indexes.
#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub(crate) users: HashMap<UserId, UserAccount>,
    pub(crate) payout_owners: HashMap<String, UserId>,
    pub(crate) listings: HashMap<ListingId, Listing>,
    pub(crate) wallets: HashMap<WalletId, Wallet>,
    pub(crate) wallet_by_user: HashMap<UserId, WalletId>,
    /// Every ledger entry, in sequence order.
    pub(crate) transactions: Vec<WalletTransaction>,
    pub(crate) tx_by_wallet: HashMap<WalletId, Vec<usize>>,
    pub(crate) orders: HashMap<OrderId, Order>,
    pub(crate) order_by_number: HashMap<OrderNumber, OrderId>,
    pub(crate) order_by_payment_ref: HashMap<String, OrderId>,
    pub(crate) timeline: HashMap<OrderId, Vec<OrderTimelineEntry>>,
    pub(crate) withdrawals: HashMap<WithdrawalId, Withdrawal>,
    pub(crate) withdrawal_by_transfer: HashMap<String, WithdrawalId>,
    pub(crate) notifications: HashMap<UserId, Vec<Notification>>,
    pub(crate) next_sequence: u64,
}

/// Writes produced by one unit of work.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    users: HashMap<UserId, UserAccount>,
    listings: HashMap<ListingId, Listing>,
    wallets: HashMap<WalletId, Wallet>,
    transactions: Vec<WalletTransaction>,
    orders: HashMap<OrderId, Order>,
    timeline: Vec<OrderTimelineEntry>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    notifications: Vec<Notification>,
    next_sequence: u64,
}

impl StagedWrites {
    pub(crate) fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl LedgerState {
    /// Fold staged writes into the committed state and refresh indexes.
    pub(crate) fn apply(&mut self, staged: StagedWrites) {
        for (id, user) in staged.users {
            if let Some(account) = &user.payout_account {
                self.payout_owners.insert(account.account_ref.clone(), id);
            }
            self.users.insert(id, user);
        }
        self.listings.extend(staged.listings);
        for (id, wallet) in staged.wallets {
            self.wallet_by_user.insert(wallet.user_id, id);
            self.wallets.insert(id, wallet);
        }
        for tx in staged.transactions {
            self.tx_by_wallet
                .entry(tx.wallet_id)
                .or_default()
                .push(self.transactions.len());
            self.transactions.push(tx);
        }
        for (id, order) in staged.orders {
            self.order_by_number.insert(order.order_number.clone(), id);
            if let Some(reference) = &order.payment_reference {
                self.order_by_payment_ref.insert(reference.clone(), id);
            }
            self.orders.insert(id, order);
        }
        for entry in staged.timeline {
            self.timeline.entry(entry.order_id).or_default().push(entry);
        }
        for (id, withdrawal) in staged.withdrawals {
            if let Some(reference) = &withdrawal.transfer_reference {
                self.withdrawal_by_transfer.insert(reference.clone(), id);
            }
            self.withdrawals.insert(id, withdrawal);
        }
        for notification in staged.notifications {
            self.notifications
                .entry(notification.user_id)
                .or_default()
                .push(notification);
        }
        self.next_sequence = staged.next_sequence;
    }
}

/// One atomic scope of reads and staged writes.
pub struct UnitOfWork<'a> {
    base: &'a LedgerState,
    staged: StagedWrites,
    now: DateTime<Utc>,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(base: &'a LedgerState, now: DateTime<Utc>) -> Self {
        Self {
            base,
            staged: StagedWrites {
                next_sequence: base.next_sequence,
                ..StagedWrites::default()
            },
            now,
        }
    }

    pub(crate) fn into_staged(self) -> StagedWrites {
        self.staged
    }

    /// Timestamp stamped on every record written in this scope.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    // =================================================================
    // Users
    // =================================================================

    #[must_use]
    pub fn user(&self, id: UserId) -> Option<&UserAccount> {
        self.staged.users.get(&id).or_else(|| self.base.users.get(&id))
    }

    pub fn require_user(&self, id: UserId) -> Result<&UserAccount> {
        self.user(id).ok_or(HybridPayError::UserNotFound(id))
    }

    pub fn user_mut(&mut self, id: UserId) -> Result<&mut UserAccount> {
        if !self.staged.users.contains_key(&id) {
            let user = self
                .base
                .users
                .get(&id)
                .cloned()
                .ok_or(HybridPayError::UserNotFound(id))?;
            self.staged.users.insert(id, user);
        }
        self.staged
            .users
            .get_mut(&id)
            .ok_or(HybridPayError::UserNotFound(id))
    }

    /// Insert or replace an account record.
    pub fn put_user(&mut self, user: UserAccount) {
        self.staged.users.insert(user.id, user);
    }

    /// Find the user whose connected payout account is `account_ref`.
    #[must_use]
    pub fn user_by_payout_account(&self, account_ref: &str) -> Option<&UserAccount> {
        let matches = |u: &&UserAccount| {
            u.payout_account
                .as_ref()
                .is_some_and(|a| a.account_ref == account_ref)
        };
        self.staged.users.values().find(matches).or_else(|| {
            self.base
                .payout_owners
                .get(account_ref)
                .and_then(|id| self.user(*id))
                .filter(matches)
        })
    }

    // =================================================================
    // Listings
    // =================================================================

    #[must_use]
    pub fn listing(&self, id: ListingId) -> Option<&Listing> {
        self.staged
            .listings
            .get(&id)
            .or_else(|| self.base.listings.get(&id))
    }

    pub fn listing_mut(&mut self, id: ListingId) -> Result<&mut Listing> {
        if !self.staged.listings.contains_key(&id) {
            let listing = self
                .base
                .listings
                .get(&id)
                .cloned()
                .ok_or(HybridPayError::ListingNotFound(id))?;
            self.staged.listings.insert(id, listing);
        }
        self.staged
            .listings
            .get_mut(&id)
            .ok_or(HybridPayError::ListingNotFound(id))
    }

    pub fn put_listing(&mut self, listing: Listing) {
        self.staged.listings.insert(listing.id, listing);
    }

    // =================================================================
    // Wallets and ledger primitives
    // =================================================================

    #[must_use]
    pub fn wallet(&self, id: WalletId) -> Option<&Wallet> {
        self.staged
            .wallets
            .get(&id)
            .or_else(|| self.base.wallets.get(&id))
    }

    pub fn require_wallet(&self, id: WalletId) -> Result<&Wallet> {
        self.wallet(id).ok_or(HybridPayError::WalletNotFound(id))
    }

    #[must_use]
    pub fn wallet_for_user(&self, user_id: UserId) -> Option<&Wallet> {
        self.staged
            .wallets
            .values()
            .find(|w| w.user_id == user_id)
            .or_else(|| {
                self.base
                    .wallet_by_user
                    .get(&user_id)
                    .and_then(|id| self.wallet(*id))
            })
    }

    /// Return the user's wallet, creating a zero-balance one if none exists.
    pub fn ensure_wallet(&mut self, user_id: UserId) -> Wallet {
        if let Some(wallet) = self.wallet_for_user(user_id) {
            return wallet.clone();
        }
        let wallet = Wallet::new(user_id, self.now);
        tracing::debug!(%user_id, wallet_id = %wallet.id, "wallet created");
        self.staged.wallets.insert(wallet.id, wallet.clone());
        wallet
    }

    /// Increase the available balance.
    pub fn credit(
        &mut self,
        wallet_id: WalletId,
        amount: Decimal,
        tx_type: TransactionType,
        reference: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<WalletTransaction> {
        check_amount(amount)?;
        self.post(wallet_id, LedgerBucket::Available, amount, tx_type, reference, metadata)
    }

    /// Increase the pending (escrowed) balance.
    pub fn credit_pending(
        &mut self,
        wallet_id: WalletId,
        amount: Decimal,
        tx_type: TransactionType,
        reference: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<WalletTransaction> {
        check_amount(amount)?;
        self.post(wallet_id, LedgerBucket::Pending, amount, tx_type, reference, metadata)
    }

    /// Decrease the available balance.
    ///
    /// # Errors
    /// `InsufficientBalance` if `amount` exceeds the available balance; the
    /// wallet is left untouched.
    pub fn debit(
        &mut self,
        wallet_id: WalletId,
        amount: Decimal,
        tx_type: TransactionType,
        reference: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<WalletTransaction> {
        check_amount(amount)?;
        let available = self.require_wallet(wallet_id)?.balance;
        if amount > available {
            return Err(HybridPayError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.post(wallet_id, LedgerBucket::Available, -amount, tx_type, reference, metadata)
    }

    /// Decrease the pending balance (escrow reversal).
    pub fn debit_pending(
        &mut self,
        wallet_id: WalletId,
        amount: Decimal,
        tx_type: TransactionType,
        reference: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<WalletTransaction> {
        check_amount(amount)?;
        let available = self.require_wallet(wallet_id)?.pending_balance;
        if amount > available {
            return Err(HybridPayError::InsufficientPending {
                needed: amount,
                available,
            });
        }
        self.post(wallet_id, LedgerBucket::Pending, -amount, tx_type, reference, metadata)
    }

    /// Move `amount` from pending into available. Writes one
    /// `ESCROW_RELEASE` entry per bucket.
    pub fn release_pending(
        &mut self,
        wallet_id: WalletId,
        amount: Decimal,
        reference: Option<String>,
    ) -> Result<[WalletTransaction; 2]> {
        let out = self.debit_pending(
            wallet_id,
            amount,
            TransactionType::EscrowRelease,
            reference.clone(),
            None,
        )?;
        let into = self.post(
            wallet_id,
            LedgerBucket::Available,
            amount,
            TransactionType::EscrowRelease,
            reference,
            None,
        )?;
        Ok([out, into])
    }

    fn post(
        &mut self,
        wallet_id: WalletId,
        bucket: LedgerBucket,
        signed_amount: Decimal,
        tx_type: TransactionType,
        reference: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<WalletTransaction> {
        let now = self.now;
        let sequence = self.staged.next_sequence;
        let wallet = self.wallet_mut(wallet_id)?;

        let balance_before = wallet.bucket(bucket);
        let balance_after = balance_before + signed_amount;
        if balance_after < Decimal::ZERO {
            return Err(HybridPayError::LedgerInvariantViolation {
                reason: format!("{wallet_id} {bucket} would become {balance_after}"),
            });
        }
        match bucket {
            LedgerBucket::Available => wallet.balance = balance_after,
            LedgerBucket::Pending => wallet.pending_balance = balance_after,
        }
        wallet.updated_at = now;

        let tx = WalletTransaction {
            id: TransactionId::new(),
            wallet_id,
            sequence,
            bucket,
            amount: signed_amount,
            balance_before,
            balance_after,
            tx_type,
            reference,
            metadata,
            created_at: now,
        };
        self.staged.next_sequence += 1;
        self.staged.transactions.push(tx.clone());
        Ok(tx)
    }

    fn wallet_mut(&mut self, id: WalletId) -> Result<&mut Wallet> {
        if !self.staged.wallets.contains_key(&id) {
            let wallet = self
                .base
                .wallets
                .get(&id)
                .cloned()
                .ok_or(HybridPayError::WalletNotFound(id))?;
            self.staged.wallets.insert(id, wallet);
        }
        self.staged
            .wallets
            .get_mut(&id)
            .ok_or(HybridPayError::WalletNotFound(id))
    }

    // =================================================================
    // Orders
    // =================================================================

    #[must_use]
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.staged
            .orders
            .get(&id)
            .or_else(|| self.base.orders.get(&id))
    }

    pub fn require_order(&self, id: OrderId) -> Result<&Order> {
        self.order(id).ok_or(HybridPayError::OrderNotFound(id))
    }

    pub fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        if !self.staged.orders.contains_key(&id) {
            let order = self
                .base
                .orders
                .get(&id)
                .cloned()
                .ok_or(HybridPayError::OrderNotFound(id))?;
            self.staged.orders.insert(id, order);
        }
        self.staged
            .orders
            .get_mut(&id)
            .ok_or(HybridPayError::OrderNotFound(id))
    }

    #[must_use]
    pub fn order_by_payment_ref(&self, reference: &str) -> Option<&Order> {
        let matches = |o: &&Order| o.payment_reference.as_deref() == Some(reference);
        self.staged.orders.values().find(matches).or_else(|| {
            self.base
                .order_by_payment_ref
                .get(reference)
                .and_then(|id| self.order(*id))
                .filter(matches)
        })
    }

    #[must_use]
    pub fn order_number_taken(&self, number: &OrderNumber) -> bool {
        self.base.order_by_number.contains_key(number)
            || self
                .staged
                .orders
                .values()
                .any(|o| &o.order_number == number)
    }

    /// Insert a new order.
    ///
    /// # Errors
    /// `Internal` if the id or order number already exists.
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        if self.order(order.id).is_some() {
            return Err(HybridPayError::Internal(format!(
                "order {} already exists",
                order.id
            )));
        }
        if self.order_number_taken(&order.order_number) {
            return Err(HybridPayError::Internal(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        self.staged.orders.insert(order.id, order);
        Ok(())
    }

    /// Append an audit entry for `order_id`.
    pub fn append_timeline(
        &mut self,
        order_id: OrderId,
        event: TimelineEvent,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) {
        self.staged.timeline.push(OrderTimelineEntry::new(
            order_id,
            event,
            description,
            metadata,
            self.now,
        ));
    }

    // =================================================================
    // Notifications
    // =================================================================

    pub fn notify(
        &mut self,
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        reference: Option<String>,
    ) {
        self.staged.notifications.push(Notification::new(
            user_id, kind, title, message, reference, self.now,
        ));
    }

    // =================================================================
    // Withdrawals
    // =================================================================

    #[must_use]
    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&Withdrawal> {
        self.staged
            .withdrawals
            .get(&id)
            .or_else(|| self.base.withdrawals.get(&id))
    }

    pub fn withdrawal_mut(&mut self, id: WithdrawalId) -> Result<&mut Withdrawal> {
        if !self.staged.withdrawals.contains_key(&id) {
            let withdrawal = self
                .base
                .withdrawals
                .get(&id)
                .cloned()
                .ok_or(HybridPayError::WithdrawalNotFound(id))?;
            self.staged.withdrawals.insert(id, withdrawal);
        }
        self.staged
            .withdrawals
            .get_mut(&id)
            .ok_or(HybridPayError::WithdrawalNotFound(id))
    }

    #[must_use]
    pub fn withdrawal_by_transfer(&self, transfer_ref: &str) -> Option<&Withdrawal> {
        let matches = |w: &&Withdrawal| w.transfer_reference.as_deref() == Some(transfer_ref);
        self.staged.withdrawals.values().find(matches).or_else(|| {
            self.base
                .withdrawal_by_transfer
                .get(transfer_ref)
                .and_then(|id| self.withdrawal(*id))
                .filter(matches)
        })
    }

    /// # Errors
    /// `Internal` if a withdrawal with the same id exists.
    pub fn insert_withdrawal(&mut self, withdrawal: Withdrawal) -> Result<()> {
        if self.withdrawal(withdrawal.id).is_some() {
            return Err(HybridPayError::Internal(format!(
                "withdrawal {} already exists",
                withdrawal.id
            )));
        }
        self.staged.withdrawals.insert(withdrawal.id, withdrawal);
        Ok(())
    }
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(HybridPayError::Validation {
            reason: format!("ledger amount must be positive, got {amount}"),
        });
    }
    if !is_cent_precise(amount) {
        return Err(HybridPayError::Validation {
            reason: format!("ledger amount {amount} has sub-cent precision"),
        });
    }
    Ok(())
}
