use super::helpers::{
    fetch_bid_for_update, fetch_load_for_update, fetch_vehicle_for_update,
    fetch_wallets_for_update, take_wallet, update_settlement,
};
use super::Engine;

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::Decimal;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{BidAPI, LoadAPI},
    auth::{Platform, Role, User},
    entities::{Bid, Load, Vehicle},
    error::Error,
    notifications::LoadEvent,
    settlement::Settlement,
};

#[async_trait]
impl BidAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn submit_bid(
        &self,
        user: User,
        load_id: Uuid,
        vehicle_id: Uuid,
        price: Decimal,
    ) -> Result<Bid, Error> {
        self.authorize(user.clone(), "submit_bid", Platform::default())?;

        let bid = Bid::new(load_id, user.id, vehicle_id, price)?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // a shared lock keeps the load from being settled while the bid lands
        let Json(load): Json<Load> = tx
            .fetch_optional(
                sqlx::query("SELECT data FROM loads WHERE id = $1 FOR SHARE").bind(&load_id),
            )
            .await?
            .ok_or_else(|| Error::not_found_error("load"))?
            .try_get("data")?;

        if !load.is_active() {
            return Err(Error::invalid_transition_error(
                "bids can only be submitted on an active load",
            ));
        }

        let Json(vehicle): Json<Vehicle> = tx
            .fetch_optional(sqlx::query("SELECT data FROM vehicles WHERE id = $1").bind(&vehicle_id))
            .await?
            .ok_or_else(|| Error::not_found_error("vehicle"))?
            .try_get("data")?;

        if vehicle.driver_id != user.id {
            return Err(Error::forbidden_error());
        }

        tx.execute(
            sqlx::query(
                "INSERT INTO bids (id, load_id, driver_id, status, data) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&bid.id)
            .bind(&bid.load_id)
            .bind(&bid.driver_id)
            .bind(bid.status.name())
            .bind(Json(&bid)),
        )
        .await?;

        tx.commit().await?;

        self.notifier.notify(LoadEvent::BidSubmitted {
            load_id,
            bid_id: bid.id,
            driver_id: user.id,
        });

        Ok(bid)
    }

    #[tracing::instrument(skip(self))]
    async fn find_bids(&self, user: User, load_id: Uuid) -> Result<Vec<Bid>, Error> {
        self.find_load(user.clone(), load_id).await?;

        let mut conn = self.pool.acquire().await?;

        let mut results = conn.fetch(
            sqlx::query("SELECT data FROM bids WHERE load_id = $1 ORDER BY data->>'createdAt', id")
                .bind(&load_id),
        );

        let mut bids = vec![];
        while let Some(row) = results.try_next().await? {
            let Json(bid): Json<Bid> = row.try_get("data")?;

            // drivers only see their own bids
            if user.role == Role::Driver && bid.driver_id != user.id {
                continue;
            }

            bids.push(bid);
        }

        Ok(bids)
    }

    #[tracing::instrument(skip(self))]
    async fn accept_bid(&self, user: User, load_id: Uuid, bid_id: Uuid) -> Result<Load, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let load = fetch_load_for_update(&mut tx, &load_id).await?;

        self.authorize(user.clone(), "accept_bid", load.clone())?;

        if load.status.is_terminal() {
            return Err(Error::conflict_error(format!("load is already {}", load.status)));
        }

        let bid = fetch_bid_for_update(&mut tx, &bid_id).await?;
        if bid.load_id != load_id {
            return Err(Error::not_found_error("bid"));
        }

        let mut wallets = fetch_wallets_for_update(&mut tx, &[load.client_id, bid.driver_id]).await?;
        let client = take_wallet(&mut wallets, &load.client_id)?;
        let driver = take_wallet(&mut wallets, &bid.driver_id)?;

        let vehicle = fetch_vehicle_for_update(&mut tx, &bid.vehicle_id).await?;

        let mut settlement = Settlement::new(load, client, None);
        settlement.accept(bid, driver, vehicle)?;

        update_settlement(&mut tx, &settlement, None).await?;

        tx.commit().await?;

        tracing::info!(%bid_id, "bid accepted");
        self.notifier.notify(LoadEvent::BidAccepted {
            load_id,
            bid_id,
            driver_id: settlement
                .assignment
                .as_ref()
                .map(|assignment| assignment.bid.driver_id)
                .unwrap_or_else(Uuid::nil),
        });

        Ok(settlement.load)
    }
}
