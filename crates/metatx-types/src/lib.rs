//! Shared data model for the meta-transaction SDK.
//!
//! Every other crate in the workspace builds on these types: registration
//! documents served by the relayer, forward requests and relay envelopes,
//! structured error codes, SDK events and the JSON-RPC provider seam.

pub mod errors;
pub mod events;
pub mod forward;
pub mod outcome;
pub mod provider;
pub mod registration;
pub mod validation;

pub use errors::*;
pub use events::*;
pub use forward::*;
pub use outcome::*;
pub use provider::*;
pub use registration::*;
pub use validation::*;
