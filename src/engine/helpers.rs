use std::collections::HashMap;

use super::Database;

use futures::TryStreamExt;
use sqlx::{postgres::PgRow, types::Json, Executor, Row, Transaction};
use uuid::Uuid;

use crate::{
    entities::{Bid, Load, Vehicle, Wallet},
    error::Error,
    settlement::{Assignment, Settlement},
};

/// Locks the load row without waiting; a load that is already being changed
/// surfaces as a conflict.
#[tracing::instrument(skip(tx))]
pub async fn fetch_load_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Load, Error> {
    let Json(load): Json<Load> = tx
        .fetch_optional(
            sqlx::query("SELECT data FROM loads WHERE id = $1 FOR UPDATE NOWAIT").bind(id),
        )
        .await?
        .ok_or_else(|| Error::not_found_error("load"))?
        .try_get("data")?;

    Ok(load)
}

#[tracing::instrument(skip(tx, load), fields(load_id = %load.id))]
pub async fn update_load(tx: &mut Transaction<'_, Database>, load: &Load) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE loads SET status = $2, data = $3 WHERE id = $1")
            .bind(&load.id)
            .bind(load.status.name())
            .bind(Json(load)),
    )
    .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
pub async fn fetch_bid_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Bid, Error> {
    let Json(bid): Json<Bid> = tx
        .fetch_optional(sqlx::query("SELECT data FROM bids WHERE id = $1 FOR UPDATE").bind(id))
        .await?
        .ok_or_else(|| Error::not_found_error("bid"))?
        .try_get("data")?;

    Ok(bid)
}

/// Locks every bid of a load, in id order.
#[tracing::instrument(skip(tx))]
pub async fn fetch_bids_for_update(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
) -> Result<Vec<Bid>, Error> {
    let rows = tx
        .fetch_all(
            sqlx::query("SELECT data FROM bids WHERE load_id = $1 ORDER BY id FOR UPDATE")
                .bind(load_id),
        )
        .await?;

    let mut bids = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let Json(bid): Json<Bid> = row.try_get("data")?;
        bids.push(bid);
    }

    Ok(bids)
}

#[tracing::instrument(skip(tx, bid), fields(bid_id = %bid.id))]
pub async fn update_bid(tx: &mut Transaction<'_, Database>, bid: &Bid) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE bids SET status = $2, data = $3 WHERE id = $1")
            .bind(&bid.id)
            .bind(bid.status.name())
            .bind(Json(bid)),
    )
    .await?;

    Ok(())
}

/// A vehicle that no longer exists is `None`; callers log and carry on.
#[tracing::instrument(skip(tx))]
pub async fn fetch_vehicle_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Option<Vehicle>, Error> {
    let maybe_result = tx
        .fetch_optional(sqlx::query("SELECT data FROM vehicles WHERE id = $1 FOR UPDATE").bind(id))
        .await?;

    match maybe_result {
        Some(result) => {
            let Json(vehicle): Json<Vehicle> = result.try_get("data")?;
            Ok(Some(vehicle))
        }
        None => Ok(None),
    }
}

#[tracing::instrument(skip(tx, vehicle), fields(vehicle_id = %vehicle.id))]
pub async fn update_vehicle(
    tx: &mut Transaction<'_, Database>,
    vehicle: &Vehicle,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("UPDATE vehicles SET data = $2 WHERE id = $1")
            .bind(&vehicle.id)
            .bind(Json(vehicle)),
    )
    .await?;

    Ok(())
}

/// Creates missing wallets with zero balances and locks all of them in
/// ascending user id order.
#[tracing::instrument(skip(tx))]
pub async fn fetch_wallets_for_update(
    tx: &mut Transaction<'_, Database>,
    user_ids: &[Uuid],
) -> Result<HashMap<Uuid, Wallet>, Error> {
    let mut user_ids = user_ids.to_vec();
    user_ids.sort();
    user_ids.dedup();

    sqlx::query(
        "INSERT INTO wallets (user_id) SELECT UNNEST($1::uuid[]) ORDER BY 1 ON CONFLICT DO NOTHING",
    )
    .bind(&user_ids[..])
    .execute(&mut *tx)
    .await?;

    let rows = sqlx::query(
        "SELECT user_id, balance, escrow, cards FROM wallets WHERE user_id = ANY($1) ORDER BY user_id FOR UPDATE",
    )
    .bind(&user_ids[..])
    .fetch_all(&mut *tx)
    .await?;

    let mut wallets = HashMap::with_capacity(rows.len());
    for row in rows.iter() {
        let wallet = wallet_from_row(row)?;
        wallets.insert(wallet.user_id, wallet);
    }

    Ok(wallets)
}

pub async fn fetch_wallet_for_update(
    tx: &mut Transaction<'_, Database>,
    user_id: &Uuid,
) -> Result<Wallet, Error> {
    let mut wallets = fetch_wallets_for_update(tx, &[*user_id]).await?;

    take_wallet(&mut wallets, user_id)
}

/// Writes the wallet's amounts and appends the journal entries recorded since
/// it was fetched.
#[tracing::instrument(skip(tx, wallet), fields(user_id = %wallet.user_id))]
pub async fn update_wallet(
    tx: &mut Transaction<'_, Database>,
    wallet: &Wallet,
) -> Result<(), Error> {
    sqlx::query("UPDATE wallets SET balance = $2, escrow = $3, cards = $4 WHERE user_id = $1")
        .bind(&wallet.user_id)
        .bind(wallet.balance)
        .bind(wallet.escrow)
        .bind(Json(&wallet.cards))
        .execute(&mut *tx)
        .await?;

    for transaction in wallet.unposted() {
        sqlx::query(
            "INSERT INTO wallet_transactions (id, user_id, amount, kind, description, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&transaction.id)
        .bind(&wallet.user_id)
        .bind(transaction.amount)
        .bind(transaction.kind.name())
        .bind(&transaction.description)
        .bind(&transaction.timestamp)
        .execute(&mut *tx)
        .await?;
    }

    Ok(())
}

/// Reads a wallet together with its journal, creating it if the user has
/// none yet.
#[tracing::instrument(skip(tx))]
pub async fn fetch_wallet_with_history(
    tx: &mut Transaction<'_, Database>,
    user_id: &Uuid,
) -> Result<Wallet, Error> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query("SELECT user_id, balance, escrow, cards FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
    let mut wallet = wallet_from_row(&row)?;

    let mut results = sqlx::query(
        "SELECT id, amount, kind, description, created_at FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch(&mut *tx);

    while let Some(row) = results.try_next().await? {
        let kind: String = row.try_get("kind")?;

        wallet.transactions.push(crate::entities::Transaction {
            id: row.try_get("id")?,
            amount: row.try_get("amount")?,
            kind: kind.parse()?,
            description: row.try_get("description")?,
            timestamp: row.try_get("created_at")?,
        });
    }

    Ok(wallet)
}

pub fn take_wallet(wallets: &mut HashMap<Uuid, Wallet>, user_id: &Uuid) -> Result<Wallet, Error> {
    wallets
        .remove(user_id)
        .ok_or_else(|| Error::not_found_error("wallet"))
}

fn wallet_from_row(row: &PgRow) -> Result<Wallet, Error> {
    let Json(cards): Json<Vec<serde_json::Value>> = row.try_get("cards")?;

    let mut wallet = Wallet::with_amounts(
        row.try_get("user_id")?,
        row.try_get("balance")?,
        row.try_get("escrow")?,
    );
    wallet.cards = cards;

    Ok(wallet)
}

/// Locks everything a transition of `load` touches. Rows are taken in a fixed
/// order: the winning bid, then every wallet involved by ascending user id,
/// then the vehicle. `platform_id` adds the fee account to the wallets.
#[tracing::instrument(skip(tx, load), fields(load_id = %load.id))]
pub async fn fetch_settlement_for_update(
    tx: &mut Transaction<'_, Database>,
    load: Load,
    platform_id: Option<&Uuid>,
) -> Result<(Settlement, Option<Wallet>), Error> {
    let bid = match load.assigned_bid_id {
        Some(bid_id) => Some(
            fetch_bid_for_update(tx, &bid_id)
                .await
                .map_err(|err| {
                    if err.is_not_found_error() {
                        Error::not_found_error("winning bid")
                    } else {
                        err
                    }
                })?,
        ),
        None => None,
    };

    let mut user_ids = vec![load.client_id];
    user_ids.extend(bid.as_ref().map(|bid| bid.driver_id));
    user_ids.extend(platform_id.copied());

    let mut wallets = fetch_wallets_for_update(tx, &user_ids).await?;

    // the platform account is checked against the parties before it is taken
    let platform = match platform_id {
        Some(id) if *id != load.client_id && bid.as_ref().map(|bid| bid.driver_id) != Some(*id) => {
            Some(take_wallet(&mut wallets, id)?)
        }
        Some(id) => wallets.get(id).cloned(),
        None => None,
    };

    let client = take_wallet(&mut wallets, &load.client_id)?;

    let assignment = match bid {
        Some(bid) => {
            let driver = take_wallet(&mut wallets, &bid.driver_id)?;
            let vehicle = fetch_vehicle_for_update(tx, &bid.vehicle_id).await?;

            Some(Assignment {
                bid,
                driver,
                vehicle,
            })
        }
        None => None,
    };

    Ok((Settlement::new(load, client, assignment), platform))
}

/// Writes back every record of a settlement snapshot.
#[tracing::instrument(skip_all, fields(load_id = %settlement.load.id))]
pub async fn update_settlement(
    tx: &mut Transaction<'_, Database>,
    settlement: &Settlement,
    platform: Option<&Wallet>,
) -> Result<(), Error> {
    update_load(tx, &settlement.load).await?;
    update_wallet(tx, &settlement.client).await?;

    if let Some(assignment) = &settlement.assignment {
        update_bid(tx, &assignment.bid).await?;
        update_wallet(tx, &assignment.driver).await?;

        if let Some(vehicle) = &assignment.vehicle {
            update_vehicle(tx, vehicle).await?;
        }
    }

    if let Some(platform) = platform {
        update_wallet(tx, platform).await?;
    }

    Ok(())
}

/// Claims the settlement of a load against a bid. A second claim for the
/// same pair is a unique violation and surfaces as a conflict.
#[tracing::instrument(skip(tx))]
pub async fn record_settlement(
    tx: &mut Transaction<'_, Database>,
    load_id: &Uuid,
    bid_id: &Uuid,
    outcome: &str,
) -> Result<(), Error> {
    tx.execute(
        sqlx::query("INSERT INTO settlements (load_id, bid_id, outcome) VALUES ($1, $2, $3)")
            .bind(load_id)
            .bind(bid_id)
            .bind(outcome),
    )
    .await?;

    Ok(())
}
