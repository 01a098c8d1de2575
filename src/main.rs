use tovar::config::Config;
use tovar::db::PgPool;
use tovar::engine::Engine;
use tovar::error::Error;
use tovar::notifications::{dispatch, Notifier};
use tovar::server::serve;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = run().await {
        tracing::error!(code = err.code, "{}", err.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let config = Config::from_env()?;

    let PgPool(pool) = PgPool::new(&config.database_url, config.max_connections).await?;

    let (notifier, receiver) = Notifier::channel();
    tokio::spawn(dispatch(receiver, config.notification_webhook.clone()));

    let engine = Engine::new(pool, config.settlement.clone(), notifier).await?;

    serve(engine, config.bind_addr).await
}
