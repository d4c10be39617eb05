//! Client for Safaricom's Daraja API: OAuth client-credential tokens,
//! Lipa na M-Pesa Online (STK push) and the result callback payload.

mod auth;
pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod phone;
pub mod stk;

pub use auth::TokenCache;
pub use callback::{CallbackEnvelope, MetadataValue, StkCallback};
pub use client::{MpesaClient, StkPushGateway};
pub use config::{CALLBACK_PATH, MpesaConfig, MpesaEnvironment};
pub use error::MpesaError;
pub use phone::normalize_phone;
pub use stk::{StkPushAccepted, StkPushRequest};
