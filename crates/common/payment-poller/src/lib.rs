//! Client-side wait loop for an initiated M-Pesa payment.
//!
//! After an STK push the subscriber confirms on their handset and the result
//! reaches the backend asynchronously. Clients poll the status endpoint until
//! the payment settles or the attempt budget runs out.

pub mod error;
pub mod poller;
pub mod source;

pub use error::PollError;
pub use poller::{PaymentPoller, PollOutcome, PollPolicy};
pub use source::{HttpStatusSource, PaymentStatusSource, RemoteStatus, StatusSnapshot};
