use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Bid, Load};
use crate::error::Error;
use crate::server::DynAPI;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParams {
    vehicle_id: Uuid,
    price: Decimal,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
    params: Result<Json<CreateParams>, JsonRejection>,
) -> Result<Json<Bid>, Error> {
    let Json(params) = params?;
    let bid = api
        .submit_bid(user, load_id, params.vehicle_id, params.price)
        .await?;

    Ok(bid.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(load_id): Path<Uuid>,
) -> Result<Json<Vec<Bid>>, Error> {
    let bids = api.find_bids(user, load_id).await?;

    Ok(bids.into())
}

pub async fn accept(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path((load_id, bid_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Load>, Error> {
    let load = api.accept_bid(user, load_id, bid_id).await?;

    Ok(load.into())
}
