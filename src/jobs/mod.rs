// Background jobs

pub mod expiry_sweeper;
