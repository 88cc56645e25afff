//! Fulfillment engine: turns conversational promises into delivered assets.
//!
//! Flow for one turn:
//! 1. **Detection** (`detect`) - score assistant replies for promises and user
//!    messages for requests
//! 2. **Context** (`context`) - recover location/level from the dialogue and
//!    build the canonical link
//! 3. **Dedup** (`dedup`) - at-most-once guard per `(tenant, lead, asset_type)`
//! 4. **Fulfillment** (`fulfillment`) - compose, send or defer, record outcome
//! 5. **Delivery** (`delivery`) - HTTP adapter for the outbound SMS gateway
//!
//! `runtime` wires the steps together for a single conversational turn.
//! Detection and context resolution are pure; everything that touches a
//! store goes through the traits in `promissory_core::ports`.

pub mod context;
pub mod dedup;
pub mod delivery;
pub mod detect;
pub mod fulfillment;
pub mod runtime;

pub use context::ConversationContextResolver;
pub use dedup::{DeliveryDeduplicator, GuardDecision};
pub use delivery::HttpMessageSender;
pub use detect::{PromiseSignalDetector, UserRequestSignalDetector};
pub use fulfillment::{FulfillmentOrchestrator, FulfillmentStores, MessageComposer};
pub use runtime::{FulfillmentRuntime, Turn, TurnReport};
