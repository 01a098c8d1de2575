use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Path};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::LoadUpdate;
use crate::auth::User;
use crate::entities::{Load, LoadChanges, NewLoad};
use crate::error::Error;
use crate::server::DynAPI;

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    params: Result<Json<NewLoad>, JsonRejection>,
) -> Result<Json<Load>, Error> {
    let Json(params) = params?;
    let load = api.create_load(user, params).await?;

    Ok(load.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Load>, Error> {
    let load = api.find_load(user, id).await?;

    Ok(load.into())
}

pub async fn update(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    changes: Result<Json<LoadChanges>, JsonRejection>,
) -> Result<Json<LoadUpdate>, Error> {
    let Json(changes) = changes?;
    let update = api.update_load(user, id, changes).await?;

    Ok(update.into())
}

pub async fn delete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Error> {
    api.delete_load(user, id).await?;

    Ok(json!({ "success": true }).into())
}
