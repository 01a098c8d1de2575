use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::money::{checked_amount, CENT_SCALE};

/// A user's funds: spendable `balance` and `escrow` held against loads.
///
/// Every mutation appends exactly one [`Transaction`] and keeps both amounts
/// non-negative; a mutation that would break that leaves the wallet untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub escrow: Decimal,
    #[serde(default)]
    pub cards: Vec<serde_json::Value>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(skip)]
    unposted: Vec<Transaction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    EscrowHold,
    EscrowRefund,
    EscrowRelease,
    EscrowCancel,
    Credit,
    Debit,
}

impl TransactionType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EscrowHold => "escrow_hold",
            Self::EscrowRefund => "escrow_refund",
            Self::EscrowRelease => "escrow_release",
            Self::EscrowCancel => "escrow_cancel",
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "escrow_hold" => Ok(Self::EscrowHold),
            "escrow_refund" => Ok(Self::EscrowRefund),
            "escrow_release" => Ok(Self::EscrowRelease),
            "escrow_cancel" => Ok(Self::EscrowCancel),
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(Error::unexpected_error(format!(
                "unknown transaction type '{}'",
                other
            ))),
        }
    }
}

impl Transaction {
    fn new(amount: Decimal, kind: TransactionType, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        }
    }
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        Self::with_amounts(user_id, Decimal::ZERO, Decimal::ZERO)
    }

    pub fn with_amounts(user_id: Uuid, balance: Decimal, escrow: Decimal) -> Self {
        Self {
            user_id,
            balance,
            escrow,
            cards: vec![],
            transactions: vec![],
            unposted: vec![],
        }
    }

    /// Journal entries appended since the wallet was loaded.
    pub fn unposted(&self) -> &[Transaction] {
        &self.unposted
    }

    pub fn has_escrow(&self, amount: Decimal) -> bool {
        self.escrow >= amount
    }

    pub fn has_balance(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Adds spendable funds.
    pub fn credit(
        &mut self,
        amount: Decimal,
        kind: TransactionType,
        description: &str,
    ) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        self.balance += amount;
        Ok(self.record(amount, kind, description))
    }

    /// Removes spendable funds.
    pub fn debit(&mut self, amount: Decimal, description: &str) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        if !self.has_balance(amount) {
            return Err(Error::insufficient_funds_error());
        }

        self.balance -= amount;
        Ok(self.record(amount, TransactionType::Debit, description))
    }

    /// Moves spendable funds into escrow.
    pub fn hold(&mut self, amount: Decimal, description: &str) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        if !self.has_balance(amount) {
            return Err(Error::insufficient_funds_error());
        }

        self.balance -= amount;
        self.escrow += amount;
        Ok(self.record(amount, TransactionType::EscrowHold, description))
    }

    /// Earmarks funds the wallet will receive once a load is delivered. The
    /// driver side of an assignment holds the bid price here without ever
    /// having spent it.
    pub fn reserve_escrow(&mut self, amount: Decimal, description: &str) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        self.escrow += amount;
        Ok(self.record(amount, TransactionType::EscrowHold, description))
    }

    pub fn move_escrow_to_balance(
        &mut self,
        amount: Decimal,
        description: &str,
    ) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        if !self.has_escrow(amount) {
            return Err(Error::insufficient_funds_error());
        }

        self.escrow -= amount;
        self.balance += amount;
        Ok(self.record(amount, TransactionType::EscrowRefund, description))
    }

    pub fn decrement_escrow(
        &mut self,
        amount: Decimal,
        kind: TransactionType,
        description: &str,
    ) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        if !self.has_escrow(amount) {
            return Err(Error::insufficient_funds_error());
        }

        self.escrow -= amount;
        Ok(self.record(amount, kind, description))
    }

    /// Releases `amount` from escrow and pays out `payout` of it to the
    /// balance, in a single journal entry.
    pub fn settle_escrow(
        &mut self,
        amount: Decimal,
        payout: Decimal,
        description: &str,
    ) -> Result<&Transaction, Error> {
        let amount = checked_amount(amount, "amount")?;

        if payout.is_sign_negative() || payout > amount || payout.normalize().scale() > CENT_SCALE {
            return Err(Error::invalid_input_error("payout must be within the settled amount"));
        }

        if !self.has_escrow(amount) {
            return Err(Error::insufficient_funds_error());
        }

        self.escrow -= amount;
        self.balance += payout;
        Ok(self.record(payout, TransactionType::Credit, description))
    }

    fn record(&mut self, amount: Decimal, kind: TransactionType, description: &str) -> &Transaction {
        let transaction = Transaction::new(amount, kind, description);

        self.transactions.push(transaction.clone());
        self.unposted.push(transaction);

        &self.transactions[self.transactions.len() - 1]
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn credit_and_debit_test() {
    let mut wallet = Wallet::new(Uuid::new_v4());

    wallet
        .credit(dec!(150), TransactionType::Credit, "deposit")
        .unwrap();
    wallet.debit(dec!(50), "withdrawal").unwrap();

    assert_eq!(wallet.balance, dec!(100));
    assert_eq!(wallet.transactions.len(), 2);
    assert_eq!(wallet.unposted().len(), 2);
    assert_eq!(wallet.transactions[1].kind, TransactionType::Debit);
}

#[test]
fn insufficient_funds_leave_wallet_untouched_test() {
    let mut wallet = Wallet::with_amounts(Uuid::new_v4(), dec!(10), dec!(5));
    let before = wallet.clone();

    assert!(wallet
        .debit(dec!(10.01), "too much")
        .unwrap_err()
        .is_insufficient_funds_error());
    assert!(wallet.hold(dec!(11), "too much").is_err());
    assert!(wallet.move_escrow_to_balance(dec!(6), "too much").is_err());
    assert!(wallet
        .decrement_escrow(dec!(6), TransactionType::EscrowCancel, "too much")
        .is_err());
    assert!(wallet.settle_escrow(dec!(6), dec!(5), "too much").is_err());
    assert!(wallet.credit(dec!(-1), TransactionType::Credit, "negative").is_err());

    assert_eq!(wallet, before);
}

#[test]
fn escrow_round_trip_test() {
    let mut wallet = Wallet::with_amounts(Uuid::new_v4(), dec!(100), Decimal::ZERO);

    wallet.hold(dec!(60), "load posted").unwrap();
    assert_eq!((wallet.balance, wallet.escrow), (dec!(40), dec!(60)));

    wallet.move_escrow_to_balance(dec!(60), "load canceled").unwrap();
    assert_eq!((wallet.balance, wallet.escrow), (dec!(100), Decimal::ZERO));

    let kinds: Vec<_> = wallet.transactions.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![TransactionType::EscrowHold, TransactionType::EscrowRefund]
    );
}

#[test]
fn settle_escrow_test() {
    let mut wallet = Wallet::with_amounts(Uuid::new_v4(), Decimal::ZERO, dec!(100));

    let transaction = wallet.settle_escrow(dec!(100), dec!(98), "delivered").unwrap();
    assert_eq!(transaction.amount, dec!(98));
    assert_eq!(transaction.kind, TransactionType::Credit);

    assert_eq!((wallet.balance, wallet.escrow), (dec!(98), Decimal::ZERO));
    assert!(wallet.settle_escrow(dec!(1), dec!(2), "overpaid").is_err());
}

#[test]
fn fractional_amounts_do_not_drift_test() {
    let mut wallet = Wallet::with_amounts(Uuid::new_v4(), dec!(0.3), Decimal::ZERO);

    wallet.hold(dec!(0.1), "a").unwrap();
    wallet.hold(dec!(0.2), "b").unwrap();

    assert_eq!(wallet.balance, Decimal::ZERO);
    assert_eq!(wallet.escrow, dec!(0.3));
    assert!(wallet.has_escrow(dec!(0.3)));
    assert!(!wallet.has_escrow(dec!(0.31)));
}

#[test]
fn sub_cent_amounts_are_refused_test() {
    let mut wallet = Wallet::with_amounts(Uuid::new_v4(), dec!(20), Decimal::ZERO);
    let before = wallet.clone();

    assert!(wallet
        .hold(dec!(10.004), "sub-cent")
        .unwrap_err()
        .is_invalid_input_error());
    assert!(wallet
        .credit(dec!(0.001), TransactionType::Credit, "sub-cent")
        .unwrap_err()
        .is_invalid_input_error());
    assert_eq!(wallet, before);

    // what is held can be released exactly
    wallet.hold(dec!(10.01), "held").unwrap();
    wallet
        .settle_escrow(dec!(10.01), dec!(9.81), "delivered")
        .unwrap();
    assert_eq!((wallet.balance, wallet.escrow), (dec!(19.80), Decimal::ZERO));
    assert!(wallet.settle_escrow(dec!(1), dec!(0.005), "sub-cent payout").is_err());
}

#[test]
fn transaction_json_shape_test() {
    let mut wallet = Wallet::new(Uuid::new_v4());
    wallet
        .credit(dec!(5), TransactionType::Credit, "deposit")
        .unwrap();

    let value = serde_json::to_value(&wallet).unwrap();
    assert_eq!(value["transactions"][0]["type"], "credit");
    assert!(value.get("unposted").is_none());
    assert_eq!(value["userId"], wallet.user_id.to_string());
}
