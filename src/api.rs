use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Bid, Load, LoadChanges, NewLoad, NewVehicle, Vehicle, Wallet};
use crate::error::Error;

/// Result of `PATCH /loads/{id}`. A delivery also reports how the payment was
/// split.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LoadUpdate {
    Updated(Load),
    Delivered(DeliveryReceipt),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub load: Load,
    pub message: String,
    pub driver_amount: Decimal,
    pub platform_fee: Decimal,
}

#[async_trait]
pub trait LoadAPI {
    async fn create_load(&self, user: User, params: NewLoad) -> Result<Load, Error>;

    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error>;

    async fn update_load(
        &self,
        user: User,
        id: Uuid,
        changes: LoadChanges,
    ) -> Result<LoadUpdate, Error>;

    async fn delete_load(&self, user: User, id: Uuid) -> Result<(), Error>;
}

#[async_trait]
pub trait BidAPI {
    async fn submit_bid(
        &self,
        user: User,
        load_id: Uuid,
        vehicle_id: Uuid,
        price: Decimal,
    ) -> Result<Bid, Error>;

    async fn find_bids(&self, user: User, load_id: Uuid) -> Result<Vec<Bid>, Error>;

    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Load, Error>;
}

#[async_trait]
pub trait WalletAPI {
    async fn find_wallet(&self, user: User) -> Result<Wallet, Error>;

    async fn deposit(
        &self,
        user: User,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Wallet, Error>;
}

#[async_trait]
pub trait VehicleAPI {
    async fn create_vehicle(&self, user: User, params: NewVehicle) -> Result<Vehicle, Error>;

    async fn find_vehicle(&self, user: User, id: Uuid) -> Result<Vehicle, Error>;
}

pub trait API: LoadAPI + BidAPI + WalletAPI + VehicleAPI {}
