//! Account ledger client trait and in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::{Money, UserId};

use crate::error::LedgerError;

/// Opaque bearer credential forwarded to the ledger on withdrawals.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Balance-keeping service that owns user funds.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Opens an account with a zero balance.
    async fn create_account(&self, user_id: UserId) -> Result<(), LedgerError>;

    /// Withdraws `amount` from the user's balance.
    ///
    /// Returns `Ok(false)` when the ledger declines for lack of funds; that
    /// is an outcome, not an error.
    async fn withdraw(
        &self,
        user_id: UserId,
        amount: Money,
        email: &str,
        auth_token: Option<&AuthToken>,
    ) -> Result<bool, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for Arc<T> {
    async fn create_account(&self, user_id: UserId) -> Result<(), LedgerError> {
        (**self).create_account(user_id).await
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        amount: Money,
        email: &str,
        auth_token: Option<&AuthToken>,
    ) -> Result<bool, LedgerError> {
        (**self).withdraw(user_id, amount, email, auth_token).await
    }
}

/// Number of recent withdrawal attempts [`InMemoryLedger`] keeps.
pub const WITHDRAWAL_LOG_CAPACITY: usize = 1024;

/// A withdrawal attempt recorded by [`InMemoryLedger`].
#[derive(Debug, Clone, PartialEq)]
pub struct Withdrawal {
    pub user_id: UserId,
    pub amount: Money,
    pub approved: bool,
    pub authenticated: bool,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<UserId, Money>,
    withdrawals: VecDeque<Withdrawal>,
    fail_on_create_account: bool,
    fail_on_withdraw: bool,
    withdraw_delay: Option<Duration>,
}

/// In-memory ledger for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds funds to an account, opening it if needed, and returns the new
    /// balance. An overflowing deposit leaves the balance untouched.
    pub fn deposit(&self, user_id: UserId, amount: Money) -> Result<Money, LedgerError> {
        let mut state = self.write();
        let balance = state.balances.entry(user_id).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(user_id))?;
        Ok(*balance)
    }

    /// Current balance, if the account exists.
    pub fn balance(&self, user_id: UserId) -> Option<Money> {
        self.read().balances.get(&user_id).copied()
    }

    /// Returns true if an account exists for the user.
    pub fn has_account(&self, user_id: UserId) -> bool {
        self.read().balances.contains_key(&user_id)
    }

    /// Recent withdrawal attempts that reached the ledger, approved or not,
    /// oldest first.
    pub fn withdrawals(&self) -> Vec<Withdrawal> {
        self.read().withdrawals.iter().cloned().collect()
    }

    /// Makes `create_account` fail.
    pub fn set_fail_on_create_account(&self, fail: bool) {
        self.write().fail_on_create_account = fail;
    }

    /// Makes `withdraw` fail with `Unavailable`.
    pub fn set_fail_on_withdraw(&self, fail: bool) {
        self.write().fail_on_withdraw = fail;
    }

    /// Delays every `withdraw` call.
    pub fn set_withdraw_delay(&self, delay: Option<Duration>) {
        self.write().withdraw_delay = delay;
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn create_account(&self, user_id: UserId) -> Result<(), LedgerError> {
        let mut state = self.write();
        if state.fail_on_create_account {
            return Err(LedgerError::Unavailable("account service down".to_string()));
        }
        if state.balances.contains_key(&user_id) {
            return Err(LedgerError::AccountExists(user_id));
        }
        state.balances.insert(user_id, Money::zero());
        Ok(())
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        amount: Money,
        _email: &str,
        auth_token: Option<&AuthToken>,
    ) -> Result<bool, LedgerError> {
        let delay = self.read().withdraw_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.write();
        if state.fail_on_withdraw {
            return Err(LedgerError::Unavailable("withdraw rejected".to_string()));
        }
        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or(LedgerError::AccountNotFound(user_id))?;

        let approved = match balance.checked_sub(amount) {
            Some(remaining) => {
                *balance = remaining;
                true
            }
            None => false,
        };
        if state.withdrawals.len() == WITHDRAWAL_LOG_CAPACITY {
            state.withdrawals.pop_front();
        }
        state.withdrawals.push_back(Withdrawal {
            user_id,
            amount,
            approved,
            authenticated: auth_token.is_some(),
        });
        Ok(approved)
    }
}
