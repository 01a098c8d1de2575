use std::sync::Mutex;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::block_on;
use uuid::Uuid;

use tovar::api::{BidAPI, LoadAPI, LoadUpdate, VehicleAPI, WalletAPI};
use tovar::auth::{Role, User};
use tovar::config::SettlementConfig;
use tovar::db::PgPool;
use tovar::engine::Engine;
use tovar::entities::{
    AssignmentStatus, BidStatus, Cargo, Load, LoadChanges, LoadStatus, NewLoad, NewVehicle, Stop,
    Vehicle,
};
use tovar::notifications::Notifier;

// schema creation is not safe to run from several connections at once
static SCHEMA: Mutex<()> = Mutex::new(());

struct Fixture {
    engine: Engine,
    platform: User,
    client: User,
    driver: User,
}

fn database_url() -> String {
    dotenv::dotenv().ok();
    std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a Postgres database")
}

async fn fixture(url: &str) -> Fixture {
    let PgPool(pool) = PgPool::new(url, 5).await.unwrap();
    let platform = User::new(Uuid::new_v4(), Role::Admin);

    let engine = {
        let _guard = SCHEMA.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let settlement = SettlementConfig {
            platform_account_id: platform.id,
            platform_fee_rate: dec!(0.02),
        };

        Engine::new(pool, settlement, Notifier::disabled())
            .await
            .unwrap()
    };

    Fixture {
        engine,
        platform,
        client: User::new(Uuid::new_v4(), Role::Client),
        driver: User::new(Uuid::new_v4(), Role::Driver),
    }
}

fn new_load(fixed_price: Decimal) -> NewLoad {
    let pickup = Utc::now() + Duration::days(1);

    NewLoad {
        fixed_price,
        cargo: Cargo {
            weight: 800.0,
            length: 2.0,
            width: 2.0,
            height: 2.5,
        },
        pickup: Stop {
            location: "Sarajevo".into(),
            date: pickup,
        },
        delivery: Stop {
            location: "Mostar".into(),
            date: pickup + Duration::days(1),
        },
        description: None,
    }
}

fn status(status: LoadStatus) -> LoadChanges {
    LoadChanges {
        status: Some(status),
        ..Default::default()
    }
}

/// Posts a load of `price`, has the fixture's driver bid `price` on it with a
/// 40 m³ vehicle and accepts that bid.
async fn assigned(fixture: &Fixture, price: Decimal) -> (Load, Vehicle) {
    let engine = &fixture.engine;

    engine
        .deposit(fixture.client.clone(), price + dec!(50), None)
        .await
        .unwrap();
    let load = engine
        .create_load(fixture.client.clone(), new_load(price))
        .await
        .unwrap();

    let vehicle = engine
        .create_vehicle(
            fixture.driver.clone(),
            NewVehicle {
                length: 10.0,
                width: 2.0,
                height: 2.0,
                volume: None,
            },
        )
        .await
        .unwrap();
    let bid = engine
        .submit_bid(fixture.driver.clone(), load.id, vehicle.id, price)
        .await
        .unwrap();

    let load = engine
        .accept_bid(fixture.client.clone(), load.id, bid.id)
        .await
        .unwrap();
    assert_eq!(load.status, LoadStatus::Sent);

    (load, vehicle)
}

#[test]
#[ignore = "requires Postgres"]
fn delivery_settles_escrow_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, vehicle) = assigned(&fixture, dec!(100)).await;

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!((client_wallet.balance, client_wallet.escrow), (dec!(50), dec!(100)));

        let vehicle_before = engine
            .find_vehicle(fixture.driver.clone(), vehicle.id)
            .await
            .unwrap();
        assert_eq!(vehicle_before.cargo_percentage, 25.0);

        let update = engine
            .update_load(fixture.driver.clone(), load.id, status(LoadStatus::Delivered))
            .await
            .unwrap();

        match update {
            LoadUpdate::Delivered(receipt) => {
                assert_eq!(receipt.load.status, LoadStatus::Delivered);
                assert_eq!(receipt.driver_amount, dec!(98));
                assert_eq!(receipt.platform_fee, dec!(2));
            }
            LoadUpdate::Updated(_) => panic!("expected a delivery receipt"),
        }

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!((client_wallet.balance, client_wallet.escrow), (dec!(50), Decimal::ZERO));

        let driver_wallet = engine.find_wallet(fixture.driver.clone()).await.unwrap();
        assert_eq!((driver_wallet.balance, driver_wallet.escrow), (dec!(98), Decimal::ZERO));

        let platform_wallet = engine.find_wallet(fixture.platform.clone()).await.unwrap();
        assert_eq!(platform_wallet.balance, dec!(2));

        let vehicle = engine
            .find_vehicle(fixture.driver.clone(), vehicle.id)
            .await
            .unwrap();
        assert_eq!(vehicle.cargo_percentage, 0.0);
        assert_eq!(vehicle.current_loads[0].status, AssignmentStatus::Delivered);
    });
}

#[test]
#[ignore = "requires Postgres"]
fn foreign_driver_cannot_settle_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, _) = assigned(&fixture, dec!(60)).await;
        let intruder = User::new(Uuid::new_v4(), Role::Driver);

        let err = engine
            .update_load(intruder, load.id, status(LoadStatus::Delivered))
            .await
            .unwrap_err();
        assert!(err.is_forbidden_error());

        let load = engine.find_load(fixture.client.clone(), load.id).await.unwrap();
        assert_eq!(load.status, LoadStatus::Sent);

        let driver_wallet = engine.find_wallet(fixture.driver.clone()).await.unwrap();
        assert_eq!((driver_wallet.balance, driver_wallet.escrow), (Decimal::ZERO, dec!(60)));
    });
}

#[test]
#[ignore = "requires Postgres"]
fn concurrent_delivery_settles_once_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, _) = assigned(&fixture, dec!(80)).await;

        let (first, second) = futures::join!(
            engine.update_load(fixture.driver.clone(), load.id, status(LoadStatus::Delivered)),
            engine.update_load(fixture.driver.clone(), load.id, status(LoadStatus::Delivered)),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| err.is_conflict_error()));

        let driver_wallet = engine.find_wallet(fixture.driver.clone()).await.unwrap();
        assert_eq!(driver_wallet.balance, dec!(78.4));
    });
}

#[test]
#[ignore = "requires Postgres"]
fn canceled_load_is_closed_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, _) = assigned(&fixture, dec!(50)).await;

        engine
            .update_load(fixture.client.clone(), load.id, status(LoadStatus::Canceled))
            .await
            .unwrap();

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!((client_wallet.balance, client_wallet.escrow), (dec!(100), Decimal::ZERO));

        let driver_wallet = engine.find_wallet(fixture.driver.clone()).await.unwrap();
        assert_eq!((driver_wallet.balance, driver_wallet.escrow), (Decimal::ZERO, Decimal::ZERO));

        for target in [LoadStatus::Active, LoadStatus::Sent, LoadStatus::Canceled] {
            let err = engine
                .update_load(fixture.client.clone(), load.id, status(target))
                .await
                .unwrap_err();
            assert!(err.is_conflict_error());
        }
    });
}

#[test]
#[ignore = "requires Postgres"]
fn reactivation_reopens_bidding_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, vehicle) = assigned(&fixture, dec!(70)).await;

        let update = engine
            .update_load(fixture.client.clone(), load.id, status(LoadStatus::Active))
            .await
            .unwrap();

        match update {
            LoadUpdate::Updated(load) => {
                assert_eq!(load.status, LoadStatus::Active);
                assert_eq!(load.assigned_bid_id, None);
            }
            LoadUpdate::Delivered(_) => panic!("expected the reactivated load"),
        }

        let bids = engine
            .find_bids(fixture.client.clone(), load.id)
            .await
            .unwrap();
        assert!(bids.iter().all(|bid| bid.status == BidStatus::Pending));

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!(client_wallet.escrow, dec!(70));

        let vehicle = engine
            .find_vehicle(fixture.driver.clone(), vehicle.id)
            .await
            .unwrap();
        assert_eq!(vehicle.cargo_percentage, 0.0);
    });
}

#[test]
#[ignore = "requires Postgres"]
fn delete_reverses_escrow_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let (load, vehicle) = assigned(&fixture, dec!(40)).await;

        engine
            .delete_load(fixture.client.clone(), load.id)
            .await
            .unwrap();

        let err = engine
            .find_load(fixture.client.clone(), load.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found_error());

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!((client_wallet.balance, client_wallet.escrow), (dec!(90), Decimal::ZERO));

        let vehicle = engine
            .find_vehicle(fixture.driver.clone(), vehicle.id)
            .await
            .unwrap();
        assert!(vehicle.current_loads.is_empty());
    });
}

#[test]
#[ignore = "requires Postgres"]
fn sub_cent_amounts_are_refused_test() {
    let url = database_url();

    block_on(async {
        let fixture = fixture(&url).await;
        let engine = &fixture.engine;

        let err = engine
            .deposit(fixture.client.clone(), dec!(0.001), None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input_error());

        engine
            .deposit(fixture.client.clone(), dec!(20), None)
            .await
            .unwrap();
        let err = engine
            .create_load(fixture.client.clone(), new_load(dec!(10.004)))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input_error());

        let load = engine
            .create_load(fixture.client.clone(), new_load(dec!(10.01)))
            .await
            .unwrap();
        let err = engine
            .submit_bid(fixture.driver.clone(), load.id, Uuid::new_v4(), dec!(10.006))
            .await
            .unwrap_err();
        assert!(err.is_invalid_input_error());

        let client_wallet = engine.find_wallet(fixture.client.clone()).await.unwrap();
        assert_eq!((client_wallet.balance, client_wallet.escrow), (dec!(9.99), dec!(10.01)));
    });
}
