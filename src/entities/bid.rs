use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::money::checked_amount;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: Uuid,
    pub load_id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub price: Decimal,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Accepted,
    Rejected,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Pending => "pending".into(),
            Self::Accepted => "accepted".into(),
            Self::Rejected => "rejected".into(),
        }
    }
}

impl Bid {
    pub fn new(
        load_id: Uuid,
        driver_id: Uuid,
        vehicle_id: Uuid,
        price: Decimal,
    ) -> Result<Self, Error> {
        let price = checked_amount(price, "bid price")?;

        Ok(Bid {
            id: Uuid::new_v4(),
            load_id,
            driver_id,
            vehicle_id,
            price,
            status: Status::Pending,
            created_at: Utc::now(),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn accept(&mut self) -> Result<(), Error> {
        match self.status {
            Status::Pending => {
                self.status = Status::Accepted;
                Ok(())
            }
            _ => Err(Error::invalid_transition_error("only pending bids can be accepted")),
        }
    }

    /// Returns the bid to the pool when its load is reactivated. Rejected
    /// bids stay rejected.
    pub fn reset(&mut self) -> bool {
        match self.status {
            Status::Accepted => {
                self.status = Status::Pending;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn bid_lifecycle_test() {
    let mut bid = Bid::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), dec!(50)).unwrap();
    assert!(bid.is_pending());

    bid.accept().unwrap();
    assert_eq!(bid.status, Status::Accepted);
    assert!(bid.accept().unwrap_err().is_invalid_transition_error());

    assert!(bid.reset());
    assert!(bid.is_pending());

    bid.status = Status::Rejected;
    assert!(!bid.reset());
    assert_eq!(bid.status, Status::Rejected);
}

#[test]
fn bid_price_must_be_positive_test() {
    let err = Bid::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Decimal::ZERO).unwrap_err();
    assert!(err.is_invalid_input_error());
}

#[test]
fn bid_price_in_whole_cents_test() {
    let err = Bid::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), dec!(10.006)).unwrap_err();
    assert!(err.is_invalid_input_error());

    let bid = Bid::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), dec!(10.01)).unwrap();
    assert_eq!(bid.price, dec!(10.01));
}
