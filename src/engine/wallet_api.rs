use super::helpers::{fetch_wallet_for_update, fetch_wallet_with_history, update_wallet};
use super::Engine;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Acquire;

use crate::{
    api::WalletAPI,
    auth::User,
    entities::{TransactionType, Wallet},
    error::Error,
};

#[async_trait]
impl WalletAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn find_wallet(&self, user: User) -> Result<Wallet, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let wallet = fetch_wallet_with_history(&mut tx, &user.id).await?;

        tx.commit().await?;

        Ok(wallet)
    }

    #[tracing::instrument(skip(self))]
    async fn deposit(
        &self,
        user: User,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<Wallet, Error> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin().await?;

        let mut wallet = fetch_wallet_for_update(&mut tx, &user.id).await?;
        wallet.credit(
            amount,
            TransactionType::Credit,
            description.as_deref().unwrap_or("deposit"),
        )?;

        update_wallet(&mut tx, &wallet).await?;
        let wallet = fetch_wallet_with_history(&mut tx, &user.id).await?;

        tx.commit().await?;

        tracing::info!(balance = %wallet.balance, "deposit credited");

        Ok(wallet)
    }
}
