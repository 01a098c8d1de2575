use oso::PolarClass;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capacity::cargo_percentage;
use crate::error::Error;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub volume: f64,
    pub cargo_percentage: f64,
    #[serde(default)]
    pub current_loads: Vec<LoadAssignment>,
}

/// A vehicle's claim on part of its volume for one load. `load_id` is a weak
/// reference; the load may no longer exist.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAssignment {
    pub load_id: Uuid,
    pub volume_used: f64,
    pub status: AssignmentStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Delivered,
    Canceled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewVehicle {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl LoadAssignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

impl Vehicle {
    pub fn new(driver_id: Uuid, params: NewVehicle) -> Result<Self, Error> {
        let dimensions = [params.length, params.width, params.height];
        if !dimensions.iter().all(|value| value.is_finite() && *value > 0.0) {
            return Err(Error::invalid_input_error("vehicle dimensions must be positive"));
        }

        let volume = params
            .volume
            .unwrap_or(params.length * params.width * params.height);
        if !(volume.is_finite() && volume > 0.0) {
            return Err(Error::invalid_input_error("vehicle volume must be positive"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            driver_id,
            length: params.length,
            width: params.width,
            height: params.height,
            volume,
            cargo_percentage: 0.0,
            current_loads: vec![],
        })
    }

    pub fn recalculate(&mut self) {
        self.cargo_percentage = cargo_percentage(self.volume, &self.current_loads);
    }

    /// Commits `volume_used` of this vehicle to a load. Re-assigning a load
    /// that already has an entry reactivates that entry.
    pub fn assign(&mut self, load_id: Uuid, volume_used: f64) {
        match self.entry_mut(&load_id) {
            Some(entry) => {
                entry.volume_used = volume_used;
                entry.status = AssignmentStatus::Active;
            }
            None => self.current_loads.push(LoadAssignment {
                load_id,
                volume_used,
                status: AssignmentStatus::Active,
            }),
        }

        self.recalculate();
    }

    /// Returns false when the vehicle carries no entry for the load.
    pub fn mark(&mut self, load_id: &Uuid, status: AssignmentStatus) -> bool {
        let found = match self.entry_mut(load_id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        };

        self.recalculate();
        found
    }

    /// Removes the load's entry altogether.
    pub fn detach(&mut self, load_id: &Uuid) -> bool {
        let before = self.current_loads.len();
        self.current_loads.retain(|entry| &entry.load_id != load_id);

        self.recalculate();
        before != self.current_loads.len()
    }

    /// The vehicle as a reader should see it, with the derived percentage
    /// recomputed from the entries.
    pub fn with_current_capacity(mut self) -> Self {
        self.recalculate();
        self
    }

    fn entry_mut(&mut self, load_id: &Uuid) -> Option<&mut LoadAssignment> {
        self.current_loads
            .iter_mut()
            .find(|entry| &entry.load_id == load_id)
    }
}

impl PolarClass for Vehicle {
    fn get_polar_class_builder() -> oso::ClassBuilder<Vehicle> {
        oso::Class::builder()
            .name("Vehicle")
            .add_attribute_getter("id", |recv: &Vehicle| recv.id.to_string())
            .add_attribute_getter("driver_id", |recv: &Vehicle| recv.driver_id.to_string())
    }

    fn get_polar_class() -> oso::Class {
        let builder = Vehicle::get_polar_class_builder();
        builder.build()
    }
}

#[cfg(test)]
pub(crate) fn sample_vehicle(driver_id: Uuid, volume: f64) -> Vehicle {
    Vehicle::new(
        driver_id,
        NewVehicle {
            length: 10.0,
            width: 2.5,
            height: 2.0,
            volume: Some(volume),
        },
    )
    .unwrap()
}

#[test]
fn assignment_lifecycle_test() {
    let mut vehicle = sample_vehicle(Uuid::new_v4(), 40.0);
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    vehicle.assign(first, 10.0);
    vehicle.assign(second, 20.0);
    assert_eq!(vehicle.cargo_percentage, 75.0);

    assert!(vehicle.mark(&first, AssignmentStatus::Delivered));
    assert_eq!(vehicle.cargo_percentage, 50.0);

    assert!(vehicle.mark(&second, AssignmentStatus::Canceled));
    assert_eq!(vehicle.cargo_percentage, 0.0);

    vehicle.assign(second, 4.0);
    assert_eq!(vehicle.current_loads.len(), 2);
    assert_eq!(vehicle.cargo_percentage, 10.0);

    assert!(vehicle.detach(&second));
    assert!(!vehicle.detach(&second));
    assert_eq!(vehicle.cargo_percentage, 0.0);
}

#[test]
fn unknown_entry_is_reported_test() {
    let mut vehicle = sample_vehicle(Uuid::new_v4(), 40.0);
    assert!(!vehicle.mark(&Uuid::new_v4(), AssignmentStatus::Delivered));
}

#[test]
fn read_path_recomputes_capacity_test() {
    let mut vehicle = sample_vehicle(Uuid::new_v4(), 40.0);
    vehicle.current_loads.push(LoadAssignment {
        load_id: Uuid::new_v4(),
        volume_used: 10.0,
        status: AssignmentStatus::Active,
    });
    vehicle.cargo_percentage = 99.0;

    assert_eq!(vehicle.with_current_capacity().cargo_percentage, 25.0);
}

#[test]
fn volume_defaults_to_dimensions_test() {
    let vehicle = Vehicle::new(
        Uuid::new_v4(),
        NewVehicle {
            length: 4.0,
            width: 2.0,
            height: 2.0,
            volume: None,
        },
    )
    .unwrap();

    assert_eq!(vehicle.volume, 16.0);
    assert!(Vehicle::new(
        Uuid::new_v4(),
        NewVehicle {
            length: 4.0,
            width: 0.0,
            height: 2.0,
            volume: None,
        },
    )
    .is_err());
}
