use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path};
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{NewVehicle, Vehicle};
use crate::error::Error;
use crate::server::DynAPI;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    params: Result<Json<NewVehicle>, JsonRejection>,
) -> Result<Json<Vehicle>, Error> {
    let Json(params) = params?;
    let vehicle = api.create_vehicle(user, params).await?;

    Ok(vehicle.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Vehicle>, Error> {
    let vehicle = api.find_vehicle(user, id).await?;

    Ok(vehicle.into())
}
