pub mod ids;

pub use ids::{AccountId, ChannelId, DonationId, OrderId, PaymentId};
