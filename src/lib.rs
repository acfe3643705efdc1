//! GiftPay - gift purchasing and peer transfer for a Telegram mini-app
//!
//! Buyers pay through Crypto Pay; a verified `invoice_paid` webhook settles
//! exactly one unit of limited inventory. The buyer then shares the gift and
//! the first user to open the link becomes its receiver.
//!
//! # Modules
//!
//! - [`core_types`] - Identifiers (UserId, GiftId, TransactionId)
//! - [`models`] - Gift, Transaction, User records
//! - [`validation`] - Structural checks for gift definitions
//! - [`store`] - Storage boundary (PostgreSQL and in-memory)
//! - [`settlement`] - Payment settlement engine
//! - [`claim`] - Ownership transfer protocol
//! - [`payment`] - Crypto Pay webhook verification and invoices
//! - [`notify`] - Telegram Bot API notifications
//! - [`share`] - Inline share tokens and deep links
//! - [`auth`] - Telegram Web App init data authentication
//! - [`gateway`] - HTTP API

// Core types - must be first!
pub mod core_types;

pub mod models;
pub mod validation;

// Storage
pub mod store;

// Core protocols
pub mod claim;
pub mod settlement;

// External collaborators
pub mod notify;
pub mod payment;
pub mod share;
pub mod signing;

// HTTP surface
pub mod auth;
pub mod gateway;

// Process setup
pub mod config;
pub mod logging;

pub use core_types::{GiftId, PaymentId, TransactionId, UserId};
pub use models::{Currency, GiftDefinition, Receiver, Transaction, TransactionStatus};
