// Models module - Database entity representations

pub mod access_log;
pub mod access_right;
pub mod access_transaction;
pub mod blacklist;
pub mod event;

pub use access_log::AccessControlLogEntry;
pub use access_right::AccessRight;
pub use access_transaction::AccessTransaction;
pub use blacklist::BlacklistEntry;
pub use event::Event;
