// Services module - Business logic

pub mod admission;
pub mod blacklist;
pub mod ledger;
pub mod qr;
pub mod signature;
