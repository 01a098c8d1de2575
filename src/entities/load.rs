use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use oso::PolarClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;
use crate::error::Error;
use crate::money::checked_amount;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    pub id: Uuid,
    pub client_id: Uuid,
    pub status: Status,
    pub fixed_price: Decimal,
    pub cargo: Cargo,
    pub pickup: Stop,
    pub delivery: Stop,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assigned_bid_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cargo {
    pub weight: f64,
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub location: String,
    pub date: DateTime<Utc>,
}

/// Canonical load status. Every historical spelling is translated here and
/// nowhere else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Status {
    Active,
    Sent,
    Delivered,
    Canceled,
}

impl Status {
    pub fn name(&self) -> String {
        match self {
            Self::Active => "active".into(),
            Self::Sent => "sent".into(),
            Self::Delivered => "delivered".into(),
            Self::Canceled => "canceled".into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "aktivan" | "aktivno" => Ok(Self::Active),
            "sent" | "poslan" | "poslano" | "shipped" => Ok(Self::Sent),
            "delivered" | "dostavljen" | "dostavljeno" => Ok(Self::Delivered),
            "canceled" | "cancelled" | "otkazan" | "otkazano" => Ok(Self::Canceled),
            other => Err(Error::malformed_input_error(format!(
                "unknown load status '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for Status {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Fields a caller may submit when posting a load.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLoad {
    pub fixed_price: Decimal,
    pub cargo: Cargo,
    pub pickup: Stop,
    pub delivery: Stop,
    #[serde(default)]
    pub description: Option<String>,
}

/// A partial update of a load, as accepted by `PATCH /loads/{id}`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadChanges {
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub fixed_price: Option<Decimal>,
    #[serde(default)]
    pub cargo: Option<Cargo>,
    #[serde(default)]
    pub pickup: Option<Stop>,
    #[serde(default)]
    pub delivery: Option<Stop>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LoadChanges {
    pub fn has_field_edits(&self) -> bool {
        self.fixed_price.is_some()
            || self.cargo.is_some()
            || self.pickup.is_some()
            || self.delivery.is_some()
            || self.description.is_some()
    }
}

/// What an accepted update request does to a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Edit,
    Cancel,
    Deliver,
    Reactivate,
}

impl Cargo {
    pub fn volume(&self) -> f64 {
        self.length * self.width * self.height
    }

    fn validate(&self) -> Result<(), Error> {
        let dimensions = [self.weight, self.length, self.width, self.height];

        if dimensions.iter().all(|value| value.is_finite() && *value > 0.0) {
            return Ok(());
        }

        Err(Error::invalid_input_error(
            "cargo weight and dimensions must be positive",
        ))
    }
}

impl Load {
    pub fn new(client_id: Uuid, params: NewLoad) -> Result<Self, Error> {
        let fixed_price = checked_amount(params.fixed_price, "fixed price")?;
        params.cargo.validate()?;
        validate_schedule(&params.pickup, &params.delivery)?;

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            client_id,
            status: Status::Active,
            fixed_price,
            cargo: params.cargo,
            pickup: params.pickup,
            delivery: params.delivery,
            description: params.description,
            assigned_bid_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Decides what an update request by an actor of `role` amounts to,
    /// without touching the load. Ownership and the assigned driver are
    /// checked elsewhere; this only enforces the status graph and the
    /// per-role field restrictions.
    #[tracing::instrument(skip(self, changes), fields(load_id = %self.id, status = %self.status))]
    pub fn plan_update(&self, role: Role, changes: &LoadChanges) -> Result<Transition, Error> {
        match role {
            Role::Driver => {
                if changes.has_field_edits() {
                    return Err(Error::forbidden_error());
                }

                match changes.status {
                    Some(Status::Canceled) | Some(Status::Delivered) => {}
                    Some(_) => return Err(Error::forbidden_error()),
                    None => return Err(Error::invalid_input_error("status is required")),
                }
            }
            Role::Client | Role::Admin => {
                if changes.status == Some(Status::Delivered) {
                    return Err(Error::forbidden_error());
                }
            }
        }

        if self.status.is_terminal() {
            return Err(Error::conflict_error(format!(
                "load is already {}",
                self.status
            )));
        }

        let transition = match (self.status, changes.status) {
            (_, None) => Transition::Edit,
            (current, Some(target)) if current == target => Transition::Edit,
            (Status::Active, Some(Status::Canceled)) | (Status::Sent, Some(Status::Canceled)) => {
                Transition::Cancel
            }
            (Status::Sent, Some(Status::Delivered)) => Transition::Deliver,
            (Status::Sent, Some(Status::Active)) => Transition::Reactivate,
            (Status::Active, Some(_)) => {
                return Err(Error::invalid_transition_error(
                    "an active load only changes status through bid acceptance or cancellation",
                ))
            }
            (current, Some(target)) => {
                return Err(Error::invalid_transition_error(format!(
                    "cannot move load from {} to {}",
                    current, target
                )))
            }
        };

        if let Some(price) = changes.fixed_price {
            checked_amount(price, "fixed price")?;

            if transition != Transition::Edit || !self.is_active() {
                return Err(Error::invalid_transition_error(
                    "the price can only change while the load is active",
                ));
            }
        }

        if let Some(cargo) = &changes.cargo {
            cargo.validate()?;
        }

        let pickup = changes.pickup.as_ref().unwrap_or(&self.pickup);
        let delivery = changes.delivery.as_ref().unwrap_or(&self.delivery);
        validate_schedule(pickup, delivery)?;

        Ok(transition)
    }

    /// Applies the non-status fields of an update. The price is applied by
    /// the settlement that rebalances escrow.
    pub fn apply_edits(&mut self, changes: &LoadChanges) {
        if let Some(cargo) = &changes.cargo {
            self.cargo = cargo.clone();
        }

        if let Some(pickup) = &changes.pickup {
            self.pickup = pickup.clone();
        }

        if let Some(delivery) = &changes.delivery {
            self.delivery = delivery.clone();
        }

        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }

        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

fn validate_schedule(pickup: &Stop, delivery: &Stop) -> Result<(), Error> {
    if delivery.date < pickup.date {
        return Err(Error::invalid_input_error(
            "delivery date cannot precede pickup date",
        ));
    }

    Ok(())
}

impl PolarClass for Load {
    fn get_polar_class_builder() -> oso::ClassBuilder<Load> {
        oso::Class::builder()
            .name("Load")
            .add_attribute_getter("id", |recv: &Load| recv.id.to_string())
            .add_attribute_getter("client_id", |recv: &Load| recv.client_id.to_string())
            .add_attribute_getter("status", |recv: &Load| recv.status.name())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Load::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
use rust_decimal_macros::dec;

#[cfg(test)]
pub(crate) fn sample_load(client_id: Uuid, fixed_price: Decimal) -> Load {
    let pickup_date = Utc::now();

    Load::new(
        client_id,
        NewLoad {
            fixed_price,
            cargo: Cargo {
                weight: 800.0,
                length: 2.0,
                width: 2.0,
                height: 2.5,
            },
            pickup: Stop {
                location: "Zagreb".into(),
                date: pickup_date,
            },
            delivery: Stop {
                location: "Split".into(),
                date: pickup_date + chrono::Duration::days(1),
            },
            description: None,
        },
    )
    .unwrap()
}

#[test]
fn status_spellings_test() {
    assert_eq!("Aktivan".parse::<Status>().unwrap(), Status::Active);
    assert_eq!("aktivan".parse::<Status>().unwrap(), Status::Active);
    assert_eq!("Poslan".parse::<Status>().unwrap(), Status::Sent);
    assert_eq!("Dostavljen".parse::<Status>().unwrap(), Status::Delivered);
    assert_eq!("dostavljen".parse::<Status>().unwrap(), Status::Delivered);
    assert_eq!("delivered".parse::<Status>().unwrap(), Status::Delivered);
    assert_eq!("Otkazan".parse::<Status>().unwrap(), Status::Canceled);
    assert_eq!(" CANCELLED ".parse::<Status>().unwrap(), Status::Canceled);
    assert!("lost".parse::<Status>().unwrap_err().is_invalid_input_error());
}

#[test]
fn status_serde_test() {
    let changes: LoadChanges = serde_json::from_str(r#"{"status":"Dostavljen"}"#).unwrap();
    assert_eq!(changes.status, Some(Status::Delivered));

    assert_eq!(
        serde_json::to_value(Status::Canceled).unwrap(),
        serde_json::json!("canceled")
    );

    assert!(serde_json::from_str::<LoadChanges>(r#"{"status":"unknown"}"#).is_err());
}

#[test]
fn load_json_shape_test() {
    let load = sample_load(Uuid::new_v4(), dec!(100));
    let value = serde_json::to_value(&load).unwrap();

    assert_eq!(value["status"], "active");
    assert_eq!(value["fixedPrice"], "100.00");
    assert!(value["assignedBidId"].is_null());

    let parsed: Load = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, load);
}

#[test]
fn new_load_validation_test() {
    let load = sample_load(Uuid::new_v4(), dec!(100));

    let mut params = NewLoad {
        fixed_price: Decimal::ZERO,
        cargo: load.cargo.clone(),
        pickup: load.pickup.clone(),
        delivery: load.delivery.clone(),
        description: None,
    };
    assert!(Load::new(load.client_id, params.clone()).is_err());

    params.fixed_price = dec!(10);
    params.cargo.height = -1.0;
    assert!(Load::new(load.client_id, params.clone()).is_err());

    params.cargo.height = 1.0;
    params.delivery.date = params.pickup.date - chrono::Duration::hours(1);
    assert!(Load::new(load.client_id, params).is_err());
}

#[test]
fn terminal_states_are_closed_test() {
    for terminal in [Status::Delivered, Status::Canceled] {
        let mut load = sample_load(Uuid::new_v4(), dec!(100));
        load.status = terminal;

        for target in [Status::Active, Status::Sent, Status::Canceled] {
            let changes = LoadChanges {
                status: Some(target),
                ..Default::default()
            };

            let err = load.plan_update(Role::Admin, &changes).unwrap_err();
            assert!(err.is_conflict_error());
        }

        let changes = LoadChanges {
            status: Some(Status::Delivered),
            ..Default::default()
        };
        assert!(load.plan_update(Role::Driver, &changes).is_err());

        let changes = LoadChanges {
            description: Some("late edit".into()),
            ..Default::default()
        };
        assert!(load
            .plan_update(Role::Client, &changes)
            .unwrap_err()
            .is_conflict_error());
    }
}

#[test]
fn active_load_transitions_test() {
    let load = sample_load(Uuid::new_v4(), dec!(100));

    let to = |status| LoadChanges {
        status: Some(status),
        ..Default::default()
    };

    assert_eq!(
        load.plan_update(Role::Client, &to(Status::Active)).unwrap(),
        Transition::Edit
    );
    assert_eq!(
        load.plan_update(Role::Client, &to(Status::Canceled)).unwrap(),
        Transition::Cancel
    );
    assert!(load
        .plan_update(Role::Admin, &to(Status::Sent))
        .unwrap_err()
        .is_invalid_transition_error());
    assert!(load
        .plan_update(Role::Driver, &to(Status::Delivered))
        .unwrap_err()
        .is_invalid_transition_error());
}

#[test]
fn sent_load_transitions_test() {
    let mut load = sample_load(Uuid::new_v4(), dec!(100));
    load.status = Status::Sent;

    let to = |status| LoadChanges {
        status: Some(status),
        ..Default::default()
    };

    assert_eq!(
        load.plan_update(Role::Driver, &to(Status::Delivered)).unwrap(),
        Transition::Deliver
    );
    assert_eq!(
        load.plan_update(Role::Driver, &to(Status::Canceled)).unwrap(),
        Transition::Cancel
    );
    assert_eq!(
        load.plan_update(Role::Admin, &to(Status::Active)).unwrap(),
        Transition::Reactivate
    );
    assert!(load
        .plan_update(Role::Client, &to(Status::Delivered))
        .unwrap_err()
        .is_forbidden_error());
}

#[test]
fn driver_field_restrictions_test() {
    let mut load = sample_load(Uuid::new_v4(), dec!(100));
    load.status = Status::Sent;

    let changes = LoadChanges {
        status: Some(Status::Delivered),
        description: Some("fragile".into()),
        ..Default::default()
    };
    assert!(load
        .plan_update(Role::Driver, &changes)
        .unwrap_err()
        .is_forbidden_error());

    let changes = LoadChanges {
        status: Some(Status::Active),
        ..Default::default()
    };
    assert!(load
        .plan_update(Role::Driver, &changes)
        .unwrap_err()
        .is_forbidden_error());
}

#[test]
fn price_edits_only_while_active_test() {
    let mut load = sample_load(Uuid::new_v4(), dec!(100));

    let changes = LoadChanges {
        fixed_price: Some(dec!(120)),
        ..Default::default()
    };
    assert_eq!(
        load.plan_update(Role::Client, &changes).unwrap(),
        Transition::Edit
    );

    let cancel_and_reprice = LoadChanges {
        status: Some(Status::Canceled),
        fixed_price: Some(dec!(120)),
        ..Default::default()
    };
    assert!(load
        .plan_update(Role::Client, &cancel_and_reprice)
        .unwrap_err()
        .is_invalid_transition_error());

    load.status = Status::Sent;
    assert!(load
        .plan_update(Role::Client, &changes)
        .unwrap_err()
        .is_invalid_transition_error());

    load.status = Status::Active;
    let negative = LoadChanges {
        fixed_price: Some(dec!(-3)),
        ..Default::default()
    };
    assert!(load
        .plan_update(Role::Client, &negative)
        .unwrap_err()
        .is_invalid_input_error());
}

#[test]
fn sub_cent_prices_are_refused_test() {
    let load = sample_load(Uuid::new_v4(), dec!(100));

    let params = NewLoad {
        fixed_price: dec!(10.004),
        cargo: load.cargo.clone(),
        pickup: load.pickup.clone(),
        delivery: load.delivery.clone(),
        description: None,
    };
    assert!(Load::new(load.client_id, params)
        .unwrap_err()
        .is_invalid_input_error());

    let changes = LoadChanges {
        fixed_price: Some(dec!(99.999)),
        ..Default::default()
    };
    assert!(load
        .plan_update(Role::Client, &changes)
        .unwrap_err()
        .is_invalid_input_error());

    // whole cents are kept at cent scale
    assert_eq!(load.fixed_price.scale(), 2);
}
