use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Raised while building a canonical delivery link. Both variants are
/// definitive: retrying with the same input can never succeed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssetUrlError {
    #[error("invalid location code `{0}`")]
    InvalidLocationCode(String),
    #[error("invalid level/type code `{0}`")]
    InvalidTypeCode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("transient delivery failure: {0}")]
    Transient(String),
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    AssetUrl(#[from] AssetUrlError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Delivery(error) => error.is_retryable(),
            Self::Store(StoreError::Unavailable(_)) => true,
            Self::Domain(_)
            | Self::AssetUrl(_)
            | Self::Store(StoreError::Decode(_))
            | Self::Configuration(_) => false,
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "domain",
            Self::AssetUrl(AssetUrlError::InvalidLocationCode(_)) => "invalid_location_code",
            Self::AssetUrl(AssetUrlError::InvalidTypeCode(_)) => "invalid_type_code",
            Self::Delivery(DeliveryError::Transient(_)) => "delivery_transient",
            Self::Delivery(DeliveryError::Permanent(_)) => "delivery_permanent",
            Self::Store(_) => "store",
            Self::Configuration(_) => "configuration",
        }
    }
}
