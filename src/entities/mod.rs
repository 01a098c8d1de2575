mod bid;
mod load;
mod vehicle;
mod wallet;

pub use bid::{Bid, Status as BidStatus};
pub use load::{Cargo, Load, LoadChanges, NewLoad, Status as LoadStatus, Stop, Transition};
pub use vehicle::{AssignmentStatus, LoadAssignment, NewVehicle, Vehicle};
pub use wallet::{Transaction, TransactionType, Wallet};

#[cfg(test)]
pub(crate) use load::sample_load;
#[cfg(test)]
pub(crate) use vehicle::sample_vehicle;
