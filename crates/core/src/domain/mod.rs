pub mod asset;
pub mod conversation;
pub mod fulfillment;
pub mod lead;
pub mod signal;
