pub mod bids;
pub mod loads;
pub mod vehicles;
pub mod wallets;
