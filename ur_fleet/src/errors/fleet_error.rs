use thiserror::Error;

/// Errors surfaced by the fleet services.
///
/// Connection supervision never returns these to a distant caller: refused and
/// failed connects are logged and retried. Provisioning errors go back to
/// whoever asked for the virtual robot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FleetError {
    #[error("no free virtual robot slot")]
    NoSlotsAvailable,

    /// A permit was granted but no slot was free. Permits and slots are
    /// provisioned 1:1, so this is an accounting bug and the permit is kept.
    #[error("admission permit granted with no free slot ({permits_available} permits still available)")]
    SlotExhaustion { permits_available: usize },

    #[error("container {name} has no slot label")]
    MissingSlotLabel { name: String },

    #[error("no robot connection registered for {0}")]
    ConnectionNotFound(String),

    /// The engine has no container by this name.
    #[error("no such container: {0}")]
    ContainerNotFound(String),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("container runtime unreachable: {0}")]
    RuntimeUnreachable(String),

    #[error("admission gate closed")]
    GateClosed,

    #[error("send error: {0}")]
    FailedToSend(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Realtime frame decode failures. Equality is used to log each distinct
/// defect once.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("realtime frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("realtime frame declares {declared} bytes but only {available} arrived")]
    SizeMismatch { declared: usize, available: usize },
}
