mod bid_api;
mod helpers;
mod load_api;
mod vehicle_api;
mod wallet_api;

use oso::Oso;
use sqlx::{Executor, Pool, Postgres};

use crate::{
    api::API, auth::authorizor, config::SettlementConfig, error::Error,
    notifications::Notifier,
};

type Database = Postgres;

pub struct Engine {
    pool: Pool<Database>,
    authorizor: Oso,
    settlement: SettlementConfig,
    notifier: Notifier,
}

impl Engine {
    #[tracing::instrument(name = "Engine::new", skip_all)]
    pub async fn new(
        pool: Pool<Database>,
        settlement: SettlementConfig,
        notifier: Notifier,
    ) -> Result<Self, Error> {
        pool.execute("CREATE TABLE IF NOT EXISTS loads (id UUID PRIMARY KEY, client_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS bids (id UUID PRIMARY KEY, load_id UUID NOT NULL REFERENCES loads(id), driver_id UUID NOT NULL, status VARCHAR NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS bids_load_id ON bids (load_id)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS vehicles (id UUID PRIMARY KEY, driver_id UUID NOT NULL, data JSONB NOT NULL)")
            .await?;

        // ledger
        pool.execute("CREATE TABLE IF NOT EXISTS wallets (user_id UUID PRIMARY KEY, balance NUMERIC(14,2) NOT NULL DEFAULT 0 CHECK (balance >= 0), escrow NUMERIC(14,2) NOT NULL DEFAULT 0 CHECK (escrow >= 0), cards JSONB NOT NULL DEFAULT '[]')")
            .await?;
        pool.execute("CREATE TABLE IF NOT EXISTS wallet_transactions (id UUID PRIMARY KEY, user_id UUID NOT NULL REFERENCES wallets(user_id), amount NUMERIC(14,2) NOT NULL, kind VARCHAR NOT NULL, description TEXT NOT NULL, created_at TIMESTAMPTZ NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS wallet_transactions_user_id ON wallet_transactions (user_id, created_at)")
            .await?;

        // one row per settled load, keyed by the bid it was settled against
        pool.execute("CREATE TABLE IF NOT EXISTS settlements (load_id UUID NOT NULL, bid_id UUID NOT NULL, outcome VARCHAR NOT NULL, settled_at TIMESTAMPTZ NOT NULL DEFAULT now(), CONSTRAINT settlements_pkey PRIMARY KEY (load_id, bid_id))")
            .await?;

        pool.execute(
            sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
                .bind(&settlement.platform_account_id),
        )
        .await?;

        tracing::info!(
            platform_account_id = %settlement.platform_account_id,
            fee_rate = %settlement.platform_fee_rate,
            "settlement engine ready"
        );

        Ok(Self {
            pool,
            authorizor: authorizor::new()?,
            settlement,
            notifier,
        })
    }
}

impl Engine {
    pub fn authorize<Actor, Action, Resource>(
        &self,
        actor: Actor,
        action: Action,
        resource: Resource,
    ) -> Result<(), Error>
    where
        Actor: oso::ToPolar,
        Action: oso::ToPolar,
        Resource: oso::ToPolar,
    {
        if self.authorizor.is_allowed(actor, action, resource)? {
            return Ok(());
        }

        Err(Error::forbidden_error())
    }
}

impl API for Engine {}
