use super::helpers::{
    fetch_bids_for_update, fetch_load_for_update, fetch_settlement_for_update,
    fetch_wallet_for_update, record_settlement, update_bid, update_load, update_settlement,
    update_vehicle, update_wallet,
};
use super::Engine;

use async_trait::async_trait;
use sqlx::{types::Json, Acquire, Executor, Row};
use uuid::Uuid;

use crate::{
    api::{DeliveryReceipt, LoadAPI, LoadUpdate},
    auth::{Platform, User},
    entities::{Load, LoadChanges, NewLoad, Transition},
    error::Error,
    notifications::LoadEvent,
    settlement::{hold_for_posting, reset_bids},
};

#[async_trait]
impl LoadAPI for Engine {
    #[tracing::instrument(skip(self, params))]
    async fn create_load(&self, user: User, params: NewLoad) -> Result<Load, Error> {
        self.authorize(user.clone(), "create_load", Platform::default())?;

        let load = Load::new(user.id, params)?;

        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut client = fetch_wallet_for_update(&mut tx, &user.id).await?;
        hold_for_posting(&load, &mut client)?;

        tx.execute(
            sqlx::query("INSERT INTO loads (id, client_id, status, data) VALUES ($1, $2, $3, $4)")
                .bind(&load.id)
                .bind(&load.client_id)
                .bind(load.status.name())
                .bind(Json(&load)),
        )
        .await?;

        update_wallet(&mut tx, &client).await?;

        tx.commit().await?;

        tracing::info!(load_id = %load.id, fixed_price = %load.fixed_price, "load posted");
        self.notifier.notify(LoadEvent::Posted {
            load_id: load.id,
            client_id: load.client_id,
        });

        Ok(load)
    }

    #[tracing::instrument(skip(self))]
    async fn find_load(&self, user: User, id: Uuid) -> Result<Load, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(load): Json<Load> = conn
            .fetch_optional(sqlx::query("SELECT data FROM loads WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(|| Error::not_found_error("load"))?
            .try_get("data")?;

        self.authorize(user.clone(), "read", load.clone())?;

        Ok(load)
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update_load(
        &self,
        user: User,
        id: Uuid,
        changes: LoadChanges,
    ) -> Result<LoadUpdate, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut load = fetch_load_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "update", load.clone())?;

        let transition = load.plan_update(user.role, &changes)?;
        tracing::info!(?transition, status = %load.status, "update planned");

        let (load, event, delivery) = match transition {
            Transition::Edit => match changes.fixed_price {
                Some(fixed_price) if fixed_price != load.fixed_price => {
                    let (mut settlement, _) =
                        fetch_settlement_for_update(&mut tx, load, None).await?;

                    settlement.reprice(fixed_price)?;
                    settlement.load.apply_edits(&changes);

                    update_settlement(&mut tx, &settlement, None).await?;

                    (settlement.load, None, None)
                }
                _ => {
                    load.apply_edits(&changes);
                    update_load(&mut tx, &load).await?;

                    (load, None, None)
                }
            },
            Transition::Cancel => {
                let (mut settlement, _) = fetch_settlement_for_update(&mut tx, load, None).await?;

                let refund = settlement.cancel(&user)?;
                tracing::info!(?refund, "load canceled");

                let bid_id = settlement
                    .assignment
                    .as_ref()
                    .map(|assignment| assignment.bid.id)
                    .unwrap_or_else(Uuid::nil);

                update_settlement(&mut tx, &settlement, None).await?;
                record_settlement(&mut tx, &id, &bid_id, "canceled").await?;

                (settlement.load, Some(LoadEvent::Canceled { load_id: id }), None)
            }
            Transition::Deliver => {
                let platform_id = self.settlement.platform_account_id;

                let (mut settlement, platform) =
                    fetch_settlement_for_update(&mut tx, load, Some(&platform_id)).await?;
                let mut platform = platform.ok_or_else(|| {
                    Error::configuration_error("FATAL: no platform admin wallet configured")
                })?;

                let delivery = settlement.deliver(
                    &user,
                    &mut platform,
                    self.settlement.platform_fee_rate,
                )?;
                tracing::info!(?delivery, "load delivered");

                // deliver only succeeds with an assignment in place
                let bid_id = settlement
                    .assignment
                    .as_ref()
                    .map(|assignment| assignment.bid.id)
                    .ok_or_else(|| Error::not_found_error("winning bid"))?;

                update_settlement(&mut tx, &settlement, Some(&platform)).await?;
                record_settlement(&mut tx, &id, &bid_id, "delivered").await?;

                let event = LoadEvent::Delivered {
                    load_id: id,
                    driver_id: user.id,
                    driver_amount: delivery.driver_amount,
                    platform_fee: delivery.platform_fee,
                };

                (settlement.load, Some(event), Some(delivery))
            }
            Transition::Reactivate => {
                let mut bids = fetch_bids_for_update(&mut tx, &id).await?;
                let (mut settlement, _) = fetch_settlement_for_update(&mut tx, load, None).await?;

                let refund = settlement.reactivate()?;
                settlement.load.apply_edits(&changes);

                let reset = reset_bids(&mut bids);
                tracing::info!(?refund, reset, "load reactivated");

                update_settlement(&mut tx, &settlement, None).await?;

                let winning_bid_id = settlement.assignment.as_ref().map(|a| a.bid.id);
                for bid in bids.iter().filter(|bid| Some(bid.id) != winning_bid_id) {
                    update_bid(&mut tx, bid).await?;
                }

                (settlement.load, Some(LoadEvent::Reactivated { load_id: id }), None)
            }
        };

        tx.commit().await?;

        if let Some(event) = event {
            self.notifier.notify(event);
        }

        match delivery {
            Some(delivery) => Ok(LoadUpdate::Delivered(DeliveryReceipt {
                load,
                message: "load delivered and payment settled".into(),
                driver_amount: delivery.driver_amount,
                platform_fee: delivery.platform_fee,
            })),
            None => Ok(LoadUpdate::Updated(load)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn delete_load(&self, user: User, id: Uuid) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let load = fetch_load_for_update(&mut tx, &id).await?;

        self.authorize(user.clone(), "delete", load.clone())?;

        fetch_bids_for_update(&mut tx, &id).await?;
        let (mut settlement, _) = fetch_settlement_for_update(&mut tx, load, None).await?;

        let refund = settlement.release();
        tracing::info!(?refund, status = %settlement.load.status, "releasing load before delete");

        update_wallet(&mut tx, &settlement.client).await?;

        if let Some(assignment) = &settlement.assignment {
            update_wallet(&mut tx, &assignment.driver).await?;

            if let Some(vehicle) = &assignment.vehicle {
                update_vehicle(&mut tx, vehicle).await?;
            }
        }

        tx.execute(sqlx::query("DELETE FROM bids WHERE load_id = $1").bind(&id))
            .await?;
        tx.execute(sqlx::query("DELETE FROM loads WHERE id = $1").bind(&id))
            .await?;

        tx.commit().await?;

        self.notifier.notify(LoadEvent::Deleted { load_id: id });

        Ok(())
    }
}
