//! Collaborator traits and in-memory implementations for settlement steps.

pub mod giftcard;
pub mod stock;
pub mod voucher;
pub mod webhook;

pub use giftcard::{GiftCardService, InMemoryGiftCardService};
pub use stock::{InMemoryStockService, StockService};
pub use voucher::{InMemoryVoucherService, VoucherService};
pub use webhook::{InMemoryNotifier, Notifier};
