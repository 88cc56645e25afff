pub mod assets;
pub mod config;
pub mod domain;
pub mod errors;
pub mod patterns;
pub mod ports;

pub use assets::{AssetUrlBuilder, Franchise, LevelTypeTable};
pub use config::{AppConfig, CatalogConfig, DetectionConfig, GuardFailureStrategy};
pub use domain::asset::{AssetSettings, AssetType, TenantAssetConfig};
pub use domain::conversation::{ConversationContext, ConversationMessage, MessageRole};
pub use domain::fulfillment::{
    DeliveryReceipt, FulfillmentOutcome, FulfillmentRecord, FulfillmentStatus, GuardKey,
    OutboundMessage, SkipReason,
};
pub use domain::lead::{LeadId, TenantId};
pub use domain::signal::{PendingPromise, PromiseSignal, RequestSignal};
pub use errors::{ApplicationError, AssetUrlError, DeliveryError, DomainError, StoreError};
pub use patterns::{Language, PatternError, PatternTables};
pub use ports::{
    AssetConfigStore, ConversationLog, GuardStore, MessageSender, PendingFulfillmentStore,
};
