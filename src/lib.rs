//! V8 CLT consignment proxy library
//!
//! Mediates access to the provider's private-consignment API: OAuth token
//! acquisition, request translation, and reuse of consults the provider has
//! already created for a borrower document.
//!
//! # Modules
//!
//! - `api`: Router and middleware.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and shared state.
//! - `lookup`: Strategies for locating an existing consult.
//! - `models`: Request, record and response models.
//! - `provider_client`: Consignment API client.
//! - `reconciler`: Consult creation, recovery, find, authorization and margin.
//! - `token_provider`: OAuth password-grant token acquisition.
//! - `webhook_handler`: Provider webhook handler.
//! - `webhook_models`: Webhook payload models.

pub mod api;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lookup;
pub mod models;
pub mod provider_client;
pub mod reconciler;
pub mod token_provider;
pub mod webhook_handler;
pub mod webhook_models;
