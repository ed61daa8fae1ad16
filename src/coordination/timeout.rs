//! HTLC timeout safety across two chains
//!
//! Both legs of a swap are locked on different ledgers whose block rates can
//! differ by orders of magnitude, so every comparison here happens in
//! wall-clock seconds, never in raw block counts. The goal is to leave the
//! party that settles second enough time to reuse the revealed secret before
//! the lock it is claiming expires.

use crate::chain::ChainParams;

use serde::Serialize;

/// Margin for order matching, transaction construction and broadcast
pub const PROPAGATION_BUFFER_SECS: u64 = 600;

/// Timeouts for both legs of a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwapTimeouts {
    pub holder_timeout_blocks: u64,
    pub seeker_timeout_blocks: u64,
    pub holder_timeout_secs: u64,
    pub seeker_timeout_secs: u64,
}

/// Compute HTLC timeouts, in blocks of each party's own chain.
///
/// The seeker's lock covers propagation plus the seeker chain's safety time.
/// The holder's lock outlives it by another propagation buffer plus the
/// safety time of both chains.
pub fn calculate_swap_timeout_blocks(holder_chain: &ChainParams, seeker_chain: &ChainParams) -> SwapTimeouts {
    let seeker_secs = PROPAGATION_BUFFER_SECS + seeker_chain.safety_time();
    let seeker_timeout_blocks = seeker_chain.secs_to_blocks(seeker_secs);
    // Rounded up to whole seeker blocks
    let seeker_timeout_secs = seeker_timeout_blocks * seeker_chain.avg_block_time;

    let holder_secs = seeker_timeout_secs
        + PROPAGATION_BUFFER_SECS
        + seeker_chain.safety_time()
        + holder_chain.safety_time();
    let holder_timeout_blocks = holder_chain.secs_to_blocks(holder_secs);
    let holder_timeout_secs = holder_timeout_blocks * holder_chain.avg_block_time;

    SwapTimeouts {
        holder_timeout_blocks,
        seeker_timeout_blocks,
        holder_timeout_secs,
        seeker_timeout_secs,
    }
}

/// Outcome of a counterparty timeout check, with the numbers behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeoutValidation {
    pub is_valid: bool,
    pub my_remaining_blocks: i64,
    pub their_remaining_blocks: i64,
    pub my_remaining_secs: i64,
    pub their_remaining_secs: i64,
    pub required_buffer_secs: i64,
    pub actual_buffer_secs: i64,
    pub reason: Option<String>,
}

/// Validate the counterparty's HTLC timeout against our own.
///
/// The secret holder needs its own lock to outlive the counterparty's by at
/// least its own chain's safety time; the seeker needs the reverse, measured
/// against the counterparty chain's safety time.
#[allow(clippy::too_many_arguments)]
pub fn validate_counterparty_timeout(
    my_timeout_block: u64,
    their_timeout_block: u64,
    my_current_height: u64,
    their_current_height: u64,
    is_secret_holder: bool,
    my_chain: &ChainParams,
    their_chain: &ChainParams,
) -> TimeoutValidation {
    let my_remaining_blocks = my_timeout_block as i64 - my_current_height as i64;
    let their_remaining_blocks = their_timeout_block as i64 - their_current_height as i64;
    let my_remaining_secs = my_chain.blocks_to_secs(my_remaining_blocks);
    let their_remaining_secs = their_chain.blocks_to_secs(their_remaining_blocks);

    let (actual_buffer_secs, required_buffer_secs) = if is_secret_holder {
        (
            my_remaining_secs - their_remaining_secs,
            my_chain.safety_time() as i64,
        )
    } else {
        (
            their_remaining_secs - my_remaining_secs,
            their_chain.safety_time() as i64,
        )
    };

    let reason = if my_remaining_blocks <= 0 {
        Some(format!(
            "own timeout already expired ({} blocks remaining)",
            my_remaining_blocks
        ))
    } else if their_remaining_blocks <= 0 {
        Some(format!(
            "counterparty timeout already expired ({} blocks remaining)",
            their_remaining_blocks
        ))
    } else if actual_buffer_secs <= 0 {
        Some(if is_secret_holder {
            "secret holder's lock does not outlive the counterparty's".to_string()
        } else {
            "counterparty's lock does not outlive the secret seeker's".to_string()
        })
    } else if actual_buffer_secs < required_buffer_secs {
        Some(format!(
            "timeout gap of {}s is below the required {}s",
            actual_buffer_secs, required_buffer_secs
        ))
    } else {
        None
    };

    TimeoutValidation {
        is_valid: reason.is_none(),
        my_remaining_blocks,
        their_remaining_blocks,
        my_remaining_secs,
        their_remaining_secs,
        required_buffer_secs,
        actual_buffer_secs,
        reason,
    }
}
