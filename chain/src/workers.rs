//! Verification worker pool port.

/// The bounded pool that runs transaction verification. The relay layer only
/// needs to know whether it is saturated: a saturated pool sheds new
/// transactions instead of queueing them.
pub trait WorkerPool: Send + Sync {
    fn saturated(&self) -> bool;
}
