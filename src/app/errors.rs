use thiserror::Error;

/// Errors raised while validating or loading a queue envelope in the
/// consumer. All of these dead-letter the delivery — see spec §4.5.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("envelope payload is not valid JSON")]
    MalformedPayload,
    #[error("invalid auto message id: {0}")]
    InvalidAutoMessageId(String),
    #[error("invalid sender id: {0}")]
    InvalidSenderId(String),
    #[error("invalid receiver id: {0}")]
    InvalidReceiverId(String),
    #[error("content must be 1..{max} characters, got {len}")]
    ContentOutOfRange { len: usize, max: usize },
    #[error("sender and receiver must differ")]
    SelfDirected,
    #[error("unsupported envelope type: {0}")]
    UnsupportedEnvelopeType(String),
}

impl ValidationError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ValidationError::MalformedPayload => "MALFORMED_PAYLOAD",
            ValidationError::InvalidAutoMessageId(_) => "INVALID_AUTO_MESSAGE_ID",
            ValidationError::InvalidSenderId(_) => "INVALID_SENDER_ID",
            ValidationError::InvalidReceiverId(_) => "INVALID_RECEIVER_ID",
            ValidationError::ContentOutOfRange { .. } => "VALIDATION_ERROR",
            ValidationError::SelfDirected => "VALIDATION_ERROR",
            ValidationError::UnsupportedEnvelopeType(_) => "VALIDATION_ERROR",
        }
    }
}

/// Errors from the Planner's user-fetch / bulk-insert steps. See spec §4.2.
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("failed to retrieve active users: {0}")]
    UserRetrievalFailed(String),
    #[error("failed to save planned messages: {0}")]
    AutoMessageSaveFailed(String),
}

impl PlannerError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PlannerError::UserRetrievalFailed(_) => "USER_RETRIEVAL_FAILED",
            PlannerError::AutoMessageSaveFailed(_) => "AUTO_MESSAGE_SAVE_FAILED",
        }
    }
}

/// Fatal (call-aborting) errors from the Dispatcher. Per-envelope publish
/// failures are *not* modeled here — they accumulate into
/// `DispatchReport::errors` instead. See spec §4.3.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("queue processing error: {0}")]
    QueueProcessingError(String),
}

impl DispatchError {
    pub fn error_code(&self) -> &'static str {
        "QUEUE_PROCESSING_ERROR"
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(#[from] diesel::result::Error),
    #[error("pool error: {0}")]
    Pool(String),
}

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("presence backend unreachable: {0}")]
    Unreachable(String),
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker connection is not active")]
    NotConnected,
    #[error("broker connect failed: {0}")]
    ConnectFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("ack/nack failed: {0}")]
    AckFailed(String),
}

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("realtime fan-out failed: {0}")]
    DeliveryFailed(String),
}
