//! Swap coordination
//!
//! The orchestrator:
//! 1. Consumes finalized events from the portal and native chains
//! 2. Reorders early transitions through the swap event queue
//! 3. Applies them to the swap and persists the result
//! 4. Performs the local party's next action, after checking timeout safety

pub mod engine;
pub mod notification;
pub mod queue;
pub mod timeout;

pub use engine::Orchestrator;
pub use notification::SwapNotification;
pub use queue::{EnqueueOutcome, QueuedEvent, SwapEventQueue};
pub use timeout::{
    calculate_swap_timeout_blocks, validate_counterparty_timeout, SwapTimeouts, TimeoutValidation,
    PROPAGATION_BUFFER_SECS,
};
