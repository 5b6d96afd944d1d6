//! Credential Store: load/save the account list atomically, merge transient
//! pool state across reloads, and expose the narrow read/update surface the
//! pool and resolver need.

mod store;

pub use store::AccountStore;
