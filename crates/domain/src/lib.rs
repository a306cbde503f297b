pub mod actor;
pub mod channel;
pub mod donation;
pub mod order;
pub mod payment;

pub use actor::Actor;
pub use channel::Channel;
pub use donation::{Donation, DonationStatus, LedgerEffect, ReviewTransition};
pub use order::{ChargeStatus, Order, OrderError, OrderEvent, OrderEventKind, OrderStatus};
pub use payment::{Payment, PaymentError};
