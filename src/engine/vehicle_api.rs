use super::Engine;

use async_trait::async_trait;
use sqlx::{types::Json, Executor, Row};
use uuid::Uuid;

use crate::{
    api::VehicleAPI,
    auth::{Platform, User},
    entities::{NewVehicle, Vehicle},
    error::Error,
};

#[async_trait]
impl VehicleAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn create_vehicle(&self, user: User, params: NewVehicle) -> Result<Vehicle, Error> {
        self.authorize(user.clone(), "register_vehicle", Platform::default())?;

        let vehicle = Vehicle::new(user.id, params)?;

        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query("INSERT INTO vehicles (id, driver_id, data) VALUES ($1, $2, $3)")
                .bind(&vehicle.id)
                .bind(&vehicle.driver_id)
                .bind(Json(&vehicle)),
        )
        .await?;

        Ok(vehicle)
    }

    /// The stored percentage is not trusted; it is recomputed from the
    /// vehicle's entries on every read.
    #[tracing::instrument(skip(self))]
    async fn find_vehicle(&self, user: User, id: Uuid) -> Result<Vehicle, Error> {
        let mut conn = self.pool.acquire().await?;

        let Json(vehicle): Json<Vehicle> = conn
            .fetch_optional(sqlx::query("SELECT data FROM vehicles WHERE id = $1").bind(&id))
            .await?
            .ok_or_else(|| Error::not_found_error("vehicle"))?
            .try_get("data")?;

        self.authorize(user.clone(), "read", vehicle.clone())?;

        Ok(vehicle.with_current_capacity())
    }
}
