pub mod account;
pub mod config;
pub mod error;
pub mod event;
pub mod login;
pub mod memory;
pub mod postgres;
pub mod retry;
pub mod store;

pub use account::Account;
pub use common::AccountId;
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use event::{BalanceEvent, BalanceEventType, EventId};
pub use login::LoginRewards;
pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use retry::{RetryPolicy, with_retry};
pub use store::{LedgerStore, LedgerStoreExt};
