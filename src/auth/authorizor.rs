use oso::{Oso, PolarClass};

use crate::auth::{Platform, User};
use crate::entities::{Load, Vehicle};
use crate::error::Error;

pub fn new() -> Result<Oso, Error> {
    let mut o = Oso::new();

    o.register_class(Platform::get_polar_class())?;
    o.register_class(User::get_polar_class())?;
    o.register_class(Load::get_polar_class())?;
    o.register_class(Vehicle::get_polar_class())?;

    o.load_str(include_str!("rules.polar"))?;

    Ok(o)
}

#[cfg(test)]
fn user(role: crate::auth::Role) -> User {
    User::new(uuid::Uuid::new_v4(), role)
}

#[test]
fn platform_actions_test() {
    use crate::auth::Role;

    let authorizor = new().unwrap();

    let client = user(Role::Client);
    let driver = user(Role::Driver);
    let admin = user(Role::Admin);

    let allowed = |user: &User, action: &str| {
        authorizor
            .is_allowed(user.clone(), action.to_string(), Platform::default())
            .unwrap()
    };

    assert!(allowed(&client, "create_load"));
    assert!(allowed(&admin, "create_load"));
    assert!(!allowed(&driver, "create_load"));

    assert!(allowed(&driver, "submit_bid"));
    assert!(!allowed(&client, "submit_bid"));

    assert!(allowed(&driver, "register_vehicle"));
    assert!(!allowed(&client, "register_vehicle"));
}

#[test]
fn load_owner_role_test() {
    use crate::auth::Role;
    use crate::entities::sample_load;

    let authorizor = new().unwrap();

    let owner = user(Role::Client);
    let stranger = user(Role::Client);
    let admin = user(Role::Admin);
    let load = sample_load(owner.id, rust_decimal::Decimal::ONE_HUNDRED);

    for action in ["read", "update", "delete", "accept_bid"] {
        let result = authorizor.is_allowed(owner.clone(), action, load.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(admin.clone(), action, load.clone());
        assert_eq!(result.unwrap(), true);

        let result = authorizor.is_allowed(stranger.clone(), action, load.clone());
        assert_eq!(result.unwrap(), false);
    }
}

#[test]
fn load_carrier_role_test() {
    use crate::auth::Role;
    use crate::entities::sample_load;

    let authorizor = new().unwrap();

    let driver = user(Role::Driver);
    let load = sample_load(uuid::Uuid::new_v4(), rust_decimal::Decimal::ONE_HUNDRED);

    let result = authorizor.is_allowed(driver.clone(), "read", load.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "update", load.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(driver.clone(), "delete", load.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(driver.clone(), "accept_bid", load.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn driver_id_does_not_grant_ownership_test() {
    use crate::auth::Role;
    use crate::entities::sample_load;

    let authorizor = new().unwrap();

    // a driver whose id happens to match the client id is still not the owner
    let driver = user(Role::Driver);
    let load = sample_load(driver.id, rust_decimal::Decimal::ONE_HUNDRED);

    let result = authorizor.is_allowed(driver.clone(), "delete", load.clone());
    assert_eq!(result.unwrap(), false);
}

#[test]
fn vehicle_owner_role_test() {
    use crate::auth::Role;
    use crate::entities::sample_vehicle;

    let authorizor = new().unwrap();

    let owner = user(Role::Driver);
    let other_driver = user(Role::Driver);
    let admin = user(Role::Admin);
    let client = user(Role::Client);
    let vehicle = sample_vehicle(owner.id, 40.0);

    let result = authorizor.is_allowed(owner.clone(), "read", vehicle.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(admin.clone(), "read", vehicle.clone());
    assert_eq!(result.unwrap(), true);

    let result = authorizor.is_allowed(other_driver.clone(), "read", vehicle.clone());
    assert_eq!(result.unwrap(), false);

    let result = authorizor.is_allowed(client.clone(), "read", vehicle.clone());
    assert_eq!(result.unwrap(), false);
}
