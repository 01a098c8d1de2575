use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::entities::Wallet;
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
pub struct DepositParams {
    amount: Decimal,
    #[serde(default)]
    description: Option<String>,
}

pub async fn find(Extension(api): Extension<DynAPI>, user: User) -> Result<Json<Wallet>, Error> {
    let wallet = api.find_wallet(user).await?;

    Ok(wallet.into())
}

pub async fn deposit(
    Extension(api): Extension<DynAPI>,
    user: User,
    params: Result<Json<DepositParams>, JsonRejection>,
) -> Result<Json<Wallet>, Error> {
    let Json(params) = params?;
    let wallet = api.deposit(user, params.amount, params.description).await?;

    Ok(wallet.into())
}
