mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequest, RequestParts},
    routing::{get, post},
    Router,
};

use crate::server::handlers::{bids, loads, vehicles, wallets};
use crate::{api::API, auth::User, error::Error};

type DynAPI = Arc<dyn API + Send + Sync>;

/// The caller of every route is resolved from the gateway's identity headers.
#[async_trait]
impl<B: Send> FromRequest<B> for User {
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        User::from_headers(req.headers())
    }
}

pub fn router<T: API + Sync + Send + 'static>(api: T) -> Router {
    let api = Arc::new(api) as DynAPI;

    Router::new()
        .route("/loads", post(loads::create))
        .route(
            "/loads/:id",
            get(loads::find).patch(loads::update).delete(loads::delete),
        )
        .route("/loads/:id/bids", get(bids::find).post(bids::create))
        .route("/loads/:id/bids/:bid_id/accept", post(bids::accept))
        .route("/wallet", get(wallets::find))
        .route("/wallet/deposit", post(wallets::deposit))
        .route("/vehicles", post(vehicles::create))
        .route("/vehicles/:id", get(vehicles::find))
        .layer(Extension(api))
}

pub async fn serve<T: API + Sync + Send + 'static>(api: T, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| Error::unexpected_error(err.to_string()))
}
