//! Settlement of orders and donations against account balances.
//!
//! This crate ties the ledger to the order and donation models:
//!
//! 1. Confirming an order debits the buyer and captures a payment.
//! 2. Reviewing donations credits (or re-debits) donors.
//! 3. The balance gateway adapts the ledger to a payment-gateway shape.
//!
//! Every flow writes the ledger before the status it justifies, so a
//! persistence failure can never leave a status without its money movement.

pub mod donations;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod repos;
pub mod services;

pub use donations::{DonationSettlement, ReviewDecision, ReviewOutcome};
pub use error::{Result, SettlementError};
pub use gateway::{BalanceGateway, GatewayResult, TransactionKind};
pub use orders::OrderSettlement;
pub use repos::{
    AccountDirectory, DonationRepository, InMemoryAccountDirectory, InMemoryDonationRepository,
    InMemoryOrderRepository, InMemoryPaymentRepository, OrderRepository, PaymentRepository,
    PostgresAccountDirectory, PostgresDonationRepository, PostgresOrderRepository,
    PostgresPaymentRepository,
};
pub use services::{
    GiftCardService, InMemoryGiftCardService, InMemoryNotifier, InMemoryStockService,
    InMemoryVoucherService, Notifier, StockService, VoucherService,
};
