//! Money movement for load transitions.
//!
//! A [`Settlement`] is a snapshot of every record one transition touches: the
//! load, the client's wallet and, once a bid has won, the bid, the driver's
//! wallet and the vehicle carrying the load. Each operation validates all of
//! its preconditions before the first mutation, so a failed operation leaves
//! the snapshot exactly as it was. The engine loads the snapshot under row
//! locks and writes it back in the same database transaction.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::{Role, User};
use crate::entities::{
    AssignmentStatus, Bid, Load, LoadStatus, TransactionType, Vehicle, Wallet,
};
use crate::error::Error;
use crate::money::{checked_amount, split_fee};

#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub load: Load,
    pub client: Wallet,
    pub assignment: Option<Assignment>,
}

/// The winning bid of a load and the records it binds together.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub bid: Bid,
    pub driver: Wallet,
    pub vehicle: Option<Vehicle>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub amount: Decimal,
    pub driver_amount: Decimal,
    pub platform_fee: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    /// Returned from the client's escrow to their balance.
    pub client_refund: Option<Decimal>,
    /// Released from the driver's escrow.
    pub driver_release: Option<Decimal>,
}

/// Moves the posted price of a new load from the client's balance into escrow.
pub fn hold_for_posting(load: &Load, client: &mut Wallet) -> Result<(), Error> {
    if client.user_id != load.client_id {
        return Err(Error::unexpected_error("wallet does not belong to the load's client"));
    }

    client.hold(load.fixed_price, &format!("escrow for load {}", load.id))?;

    Ok(())
}

/// Returns accepted bids of a reactivated load to pending. Rejected bids stay
/// rejected.
pub fn reset_bids(bids: &mut [Bid]) -> usize {
    bids.iter_mut().map(|bid| bid.reset()).filter(|reset| *reset).count()
}

impl Settlement {
    pub fn new(load: Load, client: Wallet, assignment: Option<Assignment>) -> Self {
        Self {
            load,
            client,
            assignment,
        }
    }

    /// Changes the posted price of an active load, holding or refunding the
    /// difference.
    #[tracing::instrument(skip(self), fields(load_id = %self.load.id))]
    pub fn reprice(&mut self, fixed_price: Decimal) -> Result<(), Error> {
        let fixed_price = checked_amount(fixed_price, "fixed price")?;

        if !self.load.is_active() || self.assignment.is_some() {
            return Err(Error::invalid_transition_error(
                "the price can only change while the load is active",
            ));
        }

        let difference = fixed_price - self.load.fixed_price;
        let description = format!("price change for load {}", self.load.id);

        if difference > Decimal::ZERO {
            self.client.hold(difference, &description)?;
        } else if difference < Decimal::ZERO {
            self.refund_client(-difference, &description);
        }

        self.load.fixed_price = fixed_price;
        Ok(())
    }

    /// Makes `bid` the winning bid of the load and commits the driver and the
    /// vehicle to it.
    #[tracing::instrument(skip(self, bid, driver, vehicle), fields(load_id = %self.load.id, bid_id = %bid.id))]
    pub fn accept(
        &mut self,
        mut bid: Bid,
        mut driver: Wallet,
        mut vehicle: Option<Vehicle>,
    ) -> Result<(), Error> {
        if !self.load.is_active() || self.assignment.is_some() {
            return Err(Error::invalid_transition_error(
                "bids can only be accepted on an active load",
            ));
        }

        if bid.load_id != self.load.id {
            return Err(Error::invalid_input_error("bid belongs to another load"));
        }

        if !bid.is_pending() {
            return Err(Error::invalid_transition_error("only pending bids can be accepted"));
        }

        if driver.user_id != bid.driver_id {
            return Err(Error::unexpected_error("wallet does not belong to the bidding driver"));
        }

        if let Some(vehicle) = &vehicle {
            if vehicle.id != bid.vehicle_id || vehicle.driver_id != bid.driver_id {
                return Err(Error::invalid_input_error("vehicle does not match the bid"));
            }
        }

        let difference = bid.price - self.load.fixed_price;
        if difference > Decimal::ZERO && !self.client.has_balance(difference) {
            return Err(Error::insufficient_funds_error());
        }

        let description = format!("bid {} accepted for load {}", bid.id, self.load.id);

        if difference > Decimal::ZERO {
            self.client.hold(difference, &description)?;
        } else if difference < Decimal::ZERO {
            self.refund_client(-difference, &description);
        }

        driver.reserve_escrow(bid.price, &description)?;

        match vehicle.as_mut() {
            Some(vehicle) => vehicle.assign(self.load.id, self.load.cargo.volume()),
            None => tracing::warn!(vehicle_id = %bid.vehicle_id, "bid vehicle no longer exists"),
        }

        bid.accept()?;

        self.load.assigned_bid_id = Some(bid.id);
        self.load.set_status(LoadStatus::Sent);
        self.assignment = Some(Assignment {
            bid,
            driver,
            vehicle,
        });

        Ok(())
    }

    /// Cancels the load. Each refund is applied only if the wallet still
    /// holds the amount; a skipped refund is not an error.
    #[tracing::instrument(skip(self, actor), fields(load_id = %self.load.id, actor_id = %actor.id))]
    pub fn cancel(&mut self, actor: &User) -> Result<Refund, Error> {
        let load_id = self.load.id;
        let description = format!("load {} canceled", load_id);

        let refund = match self.assignment.as_mut() {
            None => {
                if actor.role == Role::Driver || self.load.assigned_bid_id.is_some() {
                    return Err(Error::not_found_error("winning bid"));
                }

                let fixed_price = self.load.fixed_price;

                Refund {
                    client_refund: refund_guarded(&mut self.client, fixed_price, &description),
                    driver_release: None,
                }
            }
            Some(assignment) => {
                if actor.role == Role::Driver && actor.id != assignment.bid.driver_id {
                    return Err(Error::forbidden_error());
                }

                let amount = assignment.bid.price;

                let client_refund = refund_guarded(&mut self.client, amount, &description);
                let driver_release = release_guarded(&mut assignment.driver, amount, &description);
                mark_vehicle(assignment, &load_id, AssignmentStatus::Canceled);

                Refund {
                    client_refund,
                    driver_release,
                }
            }
        };

        self.load.set_status(LoadStatus::Canceled);
        Ok(refund)
    }

    /// Settles a delivered load: releases the client's escrow, pays the
    /// driver and credits the platform fee to `platform`.
    #[tracing::instrument(skip(self, actor, platform), fields(load_id = %self.load.id, actor_id = %actor.id))]
    pub fn deliver(
        &mut self,
        actor: &User,
        platform: &mut Wallet,
        fee_rate: Decimal,
    ) -> Result<Delivery, Error> {
        let load_id = self.load.id;

        let assignment = self
            .assignment
            .as_mut()
            .ok_or_else(|| Error::not_found_error("winning bid"))?;

        if actor.role != Role::Driver || actor.id != assignment.bid.driver_id {
            return Err(Error::forbidden_error());
        }

        if platform.user_id == self.client.user_id || platform.user_id == assignment.driver.user_id
        {
            return Err(Error::configuration_error(
                "platform account must differ from the client and the driver",
            ));
        }

        let amount = assignment.bid.price;
        let (driver_amount, platform_fee) = split_fee(amount, fee_rate);

        if !self.client.has_escrow(amount) || !assignment.driver.has_escrow(amount) {
            tracing::warn!(
                client_escrow = %self.client.escrow,
                driver_escrow = %assignment.driver.escrow,
                %amount,
                "escrow does not cover the delivered load"
            );
            return Err(Error::insufficient_escrow_error());
        }

        let description = format!("load {} delivered", load_id);

        self.client
            .decrement_escrow(amount, TransactionType::EscrowRelease, &description)?;
        assignment
            .driver
            .settle_escrow(amount, driver_amount, &description)?;

        if platform_fee > Decimal::ZERO {
            platform.credit(
                platform_fee,
                TransactionType::Credit,
                &format!("platform fee for load {}", load_id),
            )?;
        }

        mark_vehicle(assignment, &load_id, AssignmentStatus::Delivered);

        self.load.set_status(LoadStatus::Delivered);

        Ok(Delivery {
            amount,
            driver_amount,
            platform_fee,
        })
    }

    /// Undoes a bid acceptance: the driver's escrow is released, the client's
    /// escrow goes back to the posted price, the vehicle entry is canceled
    /// and the winning bid is pending again. The load's other bids are reset
    /// with [`reset_bids`].
    #[tracing::instrument(skip(self), fields(load_id = %self.load.id))]
    pub fn reactivate(&mut self) -> Result<Refund, Error> {
        if self.load.status != LoadStatus::Sent {
            return Err(Error::invalid_transition_error("only sent loads can be reactivated"));
        }

        let load_id = self.load.id;
        let fixed_price = self.load.fixed_price;
        let description = format!("load {} reactivated", load_id);

        let mut refund = Refund::default();

        if let Some(assignment) = self.assignment.as_mut() {
            let price = assignment.bid.price;
            let difference = fixed_price - price;

            if difference > Decimal::ZERO && !self.client.has_balance(difference) {
                return Err(Error::insufficient_funds_error());
            }

            refund.driver_release = release_guarded(&mut assignment.driver, price, &description);

            if difference > Decimal::ZERO {
                self.client.hold(difference, &description)?;
            } else if difference < Decimal::ZERO {
                refund.client_refund = refund_guarded(&mut self.client, -difference, &description);
            }

            mark_vehicle(assignment, &load_id, AssignmentStatus::Canceled);
            assignment.bid.reset();
        }

        self.load.assigned_bid_id = None;
        self.load.set_status(LoadStatus::Active);

        Ok(refund)
    }

    /// Reverses whatever escrow is still held for a load that is about to be
    /// deleted and pulls it from its vehicle.
    #[tracing::instrument(skip(self), fields(load_id = %self.load.id))]
    pub fn release(&mut self) -> Refund {
        let load_id = self.load.id;
        let description = format!("load {} deleted", load_id);

        let mut refund = Refund::default();

        match (self.load.status, self.assignment.as_mut()) {
            (LoadStatus::Active, None) => {
                let fixed_price = self.load.fixed_price;
                refund.client_refund = refund_guarded(&mut self.client, fixed_price, &description);
            }
            (LoadStatus::Sent, Some(assignment)) | (LoadStatus::Active, Some(assignment)) => {
                let amount = assignment.bid.price;

                refund.client_refund = refund_guarded(&mut self.client, amount, &description);
                refund.driver_release =
                    release_guarded(&mut assignment.driver, amount, &description);
            }
            _ => {}
        }

        if let Some(vehicle) = self
            .assignment
            .as_mut()
            .and_then(|assignment| assignment.vehicle.as_mut())
        {
            vehicle.detach(&load_id);
        }

        refund
    }

    fn refund_client(&mut self, amount: Decimal, description: &str) {
        refund_guarded(&mut self.client, amount, description);
    }
}

fn refund_guarded(wallet: &mut Wallet, amount: Decimal, description: &str) -> Option<Decimal> {
    if !wallet.has_escrow(amount) {
        tracing::warn!(user_id = %wallet.user_id, escrow = %wallet.escrow, %amount, "skipping escrow refund");
        return None;
    }

    wallet.move_escrow_to_balance(amount, description).ok()?;
    Some(amount)
}

fn release_guarded(wallet: &mut Wallet, amount: Decimal, description: &str) -> Option<Decimal> {
    if !wallet.has_escrow(amount) {
        tracing::warn!(user_id = %wallet.user_id, escrow = %wallet.escrow, %amount, "skipping escrow release");
        return None;
    }

    wallet
        .decrement_escrow(amount, TransactionType::EscrowCancel, description)
        .ok()?;
    Some(amount)
}

fn mark_vehicle(assignment: &mut Assignment, load_id: &Uuid, status: AssignmentStatus) {
    match assignment.vehicle.as_mut() {
        Some(vehicle) => {
            if !vehicle.mark(load_id, status) {
                tracing::warn!(vehicle_id = %vehicle.id, %load_id, "vehicle carries no entry for load");
            }
        }
        None => {
            tracing::warn!(vehicle_id = %assignment.bid.vehicle_id, "assigned vehicle no longer exists")
        }
    }
}

#[cfg(test)]
mod fixtures {
    use super::*;
    use crate::entities::{sample_load, sample_vehicle};
    use rust_decimal_macros::dec;

    pub const FEE_RATE: Decimal = dec!(0.02);

    pub struct Parties {
        pub client: User,
        pub driver: User,
        pub platform: Wallet,
    }

    pub fn parties() -> Parties {
        Parties {
            client: User::new(Uuid::new_v4(), Role::Client),
            driver: User::new(Uuid::new_v4(), Role::Driver),
            platform: Wallet::new(Uuid::new_v4()),
        }
    }

    /// An active load posted by `parties.client` with its price held in escrow.
    pub fn posted(parties: &Parties, price: Decimal, balance: Decimal) -> Settlement {
        let load = sample_load(parties.client.id, price);
        let mut client = Wallet::with_amounts(parties.client.id, balance, Decimal::ZERO);
        hold_for_posting(&load, &mut client).unwrap();

        Settlement::new(load, client, None)
    }

    /// A sent load whose winning bid of `bid_price` is carried by a 40 m³
    /// vehicle.
    pub fn assigned(parties: &Parties, price: Decimal, bid_price: Decimal) -> Settlement {
        let mut settlement = posted(parties, price, price.max(bid_price));

        let vehicle = sample_vehicle(parties.driver.id, 40.0);
        let bid = Bid::new(settlement.load.id, parties.driver.id, vehicle.id, bid_price).unwrap();
        let driver = Wallet::new(parties.driver.id);

        settlement.accept(bid, driver, Some(vehicle)).unwrap();
        settlement
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[test]
fn posting_holds_price_test() {
    let parties = fixtures::parties();
    let settlement = fixtures::posted(&parties, dec!(100), dec!(150));

    assert_eq!(settlement.client.balance, dec!(50));
    assert_eq!(settlement.client.escrow, dec!(100));
    assert_eq!(
        settlement.client.transactions[0].kind,
        TransactionType::EscrowHold
    );
}

#[test]
fn posting_requires_funds_test() {
    use crate::entities::sample_load;

    let client_id = Uuid::new_v4();
    let load = sample_load(client_id, dec!(100));
    let mut client = Wallet::with_amounts(client_id, dec!(99.99), Decimal::ZERO);

    let err = hold_for_posting(&load, &mut client).unwrap_err();
    assert!(err.is_insufficient_funds_error());
    assert_eq!(client.escrow, Decimal::ZERO);
}

#[test]
fn accept_commits_driver_and_vehicle_test() {
    let parties = fixtures::parties();
    let settlement = fixtures::assigned(&parties, dec!(100), dec!(80));

    assert_eq!(settlement.load.status, LoadStatus::Sent);

    let assignment = settlement.assignment.as_ref().unwrap();
    assert_eq!(settlement.load.assigned_bid_id, Some(assignment.bid.id));
    assert_eq!(assignment.driver.escrow, dec!(80));

    // the client's escrow follows the winning bid, not the posted price
    assert_eq!(settlement.client.escrow, dec!(80));
    assert_eq!(settlement.client.balance, dec!(20));

    // 2 x 2 x 2.5 m of cargo on a 40 m³ vehicle
    let vehicle = assignment.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.cargo_percentage, 25.0);
    assert!(vehicle.current_loads[0].is_active());
}

#[test]
fn accept_rejects_foreign_or_settled_bids_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::posted(&parties, dec!(100), dec!(100));
    let before = settlement.clone();

    let foreign = Bid::new(Uuid::new_v4(), parties.driver.id, Uuid::new_v4(), dec!(90)).unwrap();
    let err = settlement
        .accept(foreign, Wallet::new(parties.driver.id), None)
        .unwrap_err();
    assert!(err.is_invalid_input_error());

    let expensive = Bid::new(settlement.load.id, parties.driver.id, Uuid::new_v4(), dec!(120)).unwrap();
    let err = settlement
        .accept(expensive, Wallet::new(parties.driver.id), None)
        .unwrap_err();
    assert!(err.is_insufficient_funds_error());

    assert_eq!(settlement, before);
}

#[test]
fn scenario_a_delivery_test() {
    let mut parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(100));

    assert_eq!(settlement.client.escrow, dec!(100));
    assert_eq!(settlement.assignment.as_ref().unwrap().driver.escrow, dec!(100));

    let delivery = settlement
        .deliver(&parties.driver, &mut parties.platform, fixtures::FEE_RATE)
        .unwrap();

    assert_eq!(
        delivery,
        Delivery {
            amount: dec!(100),
            driver_amount: dec!(98),
            platform_fee: dec!(2),
        }
    );

    let assignment = settlement.assignment.as_ref().unwrap();
    assert_eq!(settlement.client.escrow, Decimal::ZERO);
    assert_eq!(assignment.driver.escrow, Decimal::ZERO);
    assert_eq!(assignment.driver.balance, dec!(98));
    assert_eq!(parties.platform.balance, dec!(2));
    assert_eq!(settlement.load.status, LoadStatus::Delivered);

    let vehicle = assignment.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.current_loads[0].status, AssignmentStatus::Delivered);
    assert_eq!(vehicle.cargo_percentage, 0.0);

    assert_eq!(
        settlement.client.unposted().last().unwrap().kind,
        TransactionType::EscrowRelease
    );
    assert_eq!(
        assignment.driver.unposted().last().unwrap().kind,
        TransactionType::Credit
    );
}

#[test]
fn delivery_conservation_test() {
    for price in [dec!(0.5), dec!(19.99), dec!(250), dec!(1234.56), dec!(10.01)] {
        let mut parties = fixtures::parties();
        let mut settlement = fixtures::assigned(&parties, price, price);

        let client_escrow = settlement.client.escrow;
        let driver_balance = settlement.assignment.as_ref().unwrap().driver.balance;
        let platform_balance = parties.platform.balance;

        let delivery = settlement
            .deliver(&parties.driver, &mut parties.platform, fixtures::FEE_RATE)
            .unwrap();

        let driver = &settlement.assignment.as_ref().unwrap().driver;
        let client_delta = client_escrow - settlement.client.escrow;
        let driver_delta = driver.balance - driver_balance;
        let platform_delta = parties.platform.balance - platform_balance;

        assert_eq!(client_delta, price);
        assert_eq!(driver_delta, delivery.driver_amount);
        assert_eq!(platform_delta, delivery.platform_fee);
        assert_eq!(driver_delta + platform_delta, client_delta);
        assert_eq!(settlement.client.escrow, Decimal::ZERO);
        assert_eq!(driver.escrow, Decimal::ZERO);
    }
}

#[test]
fn insufficient_driver_escrow_changes_nothing_test() {
    let mut parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(100));
    settlement.assignment.as_mut().unwrap().driver.escrow = dec!(99);

    let settlement_before = settlement.clone();
    let platform_before = parties.platform.clone();

    let err = settlement
        .deliver(&parties.driver, &mut parties.platform, fixtures::FEE_RATE)
        .unwrap_err();

    assert!(err.is_insufficient_escrow_error());
    assert_eq!(settlement, settlement_before);
    assert_eq!(parties.platform, platform_before);
}

#[test]
fn insufficient_client_escrow_changes_nothing_test() {
    let mut parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(100));
    settlement.client.escrow = Decimal::ZERO;

    let before = settlement.clone();

    let err = settlement
        .deliver(&parties.driver, &mut parties.platform, fixtures::FEE_RATE)
        .unwrap_err();

    assert!(err.is_insufficient_escrow_error());
    assert_eq!(settlement, before);
}

#[test]
fn scenario_b_cancellation_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(50), dec!(50));

    let balance_before = settlement.client.balance;

    let refund = settlement.cancel(&parties.client).unwrap();

    assert_eq!(
        refund,
        Refund {
            client_refund: Some(dec!(50)),
            driver_release: Some(dec!(50)),
        }
    );
    assert_eq!(settlement.client.escrow, Decimal::ZERO);
    assert_eq!(settlement.client.balance, balance_before + dec!(50));

    let assignment = settlement.assignment.as_ref().unwrap();
    assert_eq!(assignment.driver.escrow, Decimal::ZERO);
    assert_eq!(assignment.driver.balance, Decimal::ZERO);
    assert_eq!(
        assignment.driver.unposted().last().unwrap().kind,
        TransactionType::EscrowCancel
    );

    let vehicle = assignment.vehicle.as_ref().unwrap();
    assert_eq!(vehicle.current_loads[0].status, AssignmentStatus::Canceled);
    assert_eq!(vehicle.cargo_percentage, 0.0);

    assert_eq!(settlement.load.status, LoadStatus::Canceled);
}

#[test]
fn cancellation_guards_are_independent_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(50), dec!(50));
    settlement.assignment.as_mut().unwrap().driver.escrow = dec!(10);

    let refund = settlement.cancel(&parties.client).unwrap();

    assert_eq!(refund.client_refund, Some(dec!(50)));
    assert_eq!(refund.driver_release, None);
    assert_eq!(settlement.assignment.as_ref().unwrap().driver.escrow, dec!(10));
    assert_eq!(settlement.load.status, LoadStatus::Canceled);
}

#[test]
fn cancel_before_assignment_refunds_posting_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::posted(&parties, dec!(70), dec!(100));

    let refund = settlement.cancel(&parties.client).unwrap();

    assert_eq!(refund.client_refund, Some(dec!(70)));
    assert_eq!(settlement.client.balance, dec!(100));
    assert_eq!(settlement.client.escrow, Decimal::ZERO);
}

#[test]
fn driver_cannot_cancel_unassigned_load_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::posted(&parties, dec!(70), dec!(100));
    let before = settlement.clone();

    let err = settlement.cancel(&parties.driver).unwrap_err();

    assert!(err.is_not_found_error());
    assert_eq!(settlement, before);
}

#[test]
fn scenario_c_foreign_driver_test() {
    let mut parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(100));

    let settlement_before = settlement.clone();
    let platform_before = parties.platform.clone();
    let intruder = User::new(Uuid::new_v4(), Role::Driver);

    let err = settlement
        .deliver(&intruder, &mut parties.platform, fixtures::FEE_RATE)
        .unwrap_err();
    assert!(err.is_forbidden_error());

    let err = settlement.cancel(&intruder).unwrap_err();
    assert!(err.is_forbidden_error());

    assert_eq!(settlement, settlement_before);
    assert_eq!(parties.platform, platform_before);
}

#[test]
fn assigned_driver_may_cancel_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(100));

    settlement.cancel(&parties.driver).unwrap();
    assert_eq!(settlement.load.status, LoadStatus::Canceled);
}

#[test]
fn scenario_d_reactivation_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(100), dec!(80));

    let winning = settlement.assignment.as_ref().unwrap().bid.clone();
    let mut bids = vec![
        winning,
        Bid::new(settlement.load.id, Uuid::new_v4(), Uuid::new_v4(), dec!(90)).unwrap(),
        Bid::new(settlement.load.id, Uuid::new_v4(), Uuid::new_v4(), dec!(95)).unwrap(),
    ];
    bids[2].status = crate::entities::BidStatus::Rejected;

    let refund = settlement.reactivate().unwrap();
    assert_eq!(reset_bids(&mut bids), 1);
    assert!(settlement.assignment.as_ref().unwrap().bid.is_pending());

    assert_eq!(settlement.load.status, LoadStatus::Active);
    assert_eq!(settlement.load.assigned_bid_id, None);
    assert!(bids[0].is_pending());
    assert!(bids[1].is_pending());
    assert_eq!(bids[2].status, crate::entities::BidStatus::Rejected);

    // escrow is back to the posted price and the driver is released
    assert_eq!(refund.driver_release, Some(dec!(80)));
    assert_eq!(settlement.client.escrow, dec!(100));
    assert_eq!(settlement.client.balance, Decimal::ZERO);

    let assignment = settlement.assignment.as_ref().unwrap();
    assert_eq!(assignment.driver.escrow, Decimal::ZERO);
    assert_eq!(
        assignment.vehicle.as_ref().unwrap().current_loads[0].status,
        AssignmentStatus::Canceled
    );
}

#[test]
fn reprice_rebalances_escrow_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::posted(&parties, dec!(100), dec!(130));

    settlement.reprice(dec!(120)).unwrap();
    assert_eq!((settlement.client.balance, settlement.client.escrow), (dec!(10), dec!(120)));

    settlement.reprice(dec!(60)).unwrap();
    assert_eq!((settlement.client.balance, settlement.client.escrow), (dec!(70), dec!(60)));

    let before = settlement.clone();
    let err = settlement.reprice(dec!(200)).unwrap_err();
    assert!(err.is_insufficient_funds_error());
    assert_eq!(settlement, before);
}

#[test]
fn release_before_delete_test() {
    let parties = fixtures::parties();

    let mut active = fixtures::posted(&parties, dec!(40), dec!(40));
    let refund = active.release();
    assert_eq!(refund.client_refund, Some(dec!(40)));
    assert_eq!(active.client.balance, dec!(40));

    let mut sent = fixtures::assigned(&parties, dec!(40), dec!(40));
    let refund = sent.release();
    assert_eq!(
        refund,
        Refund {
            client_refund: Some(dec!(40)),
            driver_release: Some(dec!(40)),
        }
    );
    let vehicle = sent.assignment.as_ref().unwrap().vehicle.as_ref().unwrap();
    assert!(vehicle.current_loads.is_empty());
    assert_eq!(vehicle.cargo_percentage, 0.0);
}

#[test]
fn wallets_never_go_negative_test() {
    let mut parties = fixtures::parties();
    let mut settlement = fixtures::assigned(&parties, dec!(30), dec!(30));

    // drain escrow out from under the settlement, then try every path
    settlement.client.escrow = dec!(5);
    settlement.assignment.as_mut().unwrap().driver.escrow = dec!(5);

    let _ = settlement.deliver(&parties.driver, &mut parties.platform, fixtures::FEE_RATE);
    let _ = settlement.release();
    let _ = settlement.cancel(&parties.client);

    let driver = &settlement.assignment.as_ref().unwrap().driver;
    for wallet in [&settlement.client, driver, &parties.platform] {
        assert!(wallet.balance >= Decimal::ZERO);
        assert!(wallet.escrow >= Decimal::ZERO);
    }
}

#[test]
fn sub_cent_prices_never_reach_escrow_test() {
    let parties = fixtures::parties();
    let mut settlement = fixtures::posted(&parties, dec!(10.01), dec!(20));
    let before = settlement.clone();

    let err = settlement.reprice(dec!(10.004)).unwrap_err();
    assert!(err.is_invalid_input_error());
    assert_eq!(settlement, before);

    assert!(Bid::new(settlement.load.id, parties.driver.id, Uuid::new_v4(), dec!(10.006))
        .unwrap_err()
        .is_invalid_input_error());

    // a bid a cent above the posted price tops up the escrow exactly
    let vehicle = crate::entities::sample_vehicle(parties.driver.id, 40.0);
    let bid = Bid::new(settlement.load.id, parties.driver.id, vehicle.id, dec!(10.02)).unwrap();
    settlement
        .accept(bid, Wallet::new(parties.driver.id), Some(vehicle))
        .unwrap();
    assert_eq!(settlement.client.escrow, dec!(10.02));

    let mut platform = Wallet::new(Uuid::new_v4());
    let delivery = settlement
        .deliver(&parties.driver, &mut platform, fixtures::FEE_RATE)
        .unwrap();
    assert_eq!(delivery.platform_fee, dec!(0.20));
    assert_eq!(delivery.driver_amount, dec!(9.82));
    assert_eq!(settlement.client.escrow, Decimal::ZERO);
    assert_eq!(settlement.client.balance, dec!(9.98));
}
