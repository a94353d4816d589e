//! # sluice-decay: Checkpointed decay/weight engine.
//!
//! All calculations use integer arithmetic only.
//!
//! A temporary lock of `amount` ending at `end` weighs
//! `amount * (end - t) / MAX_LOCK_DURATION` at time `t`, reaching zero at
//! `end`; a permanent lock weighs `amount` forever. The engine keeps:
//! - **User points**: an append-only history per record, so the weight of any
//!   record can be reconstructed at any past time.
//! - **Global points**: an append-only aggregate history with one point per
//!   epoch boundary crossed, plus one per mutation.
//! - **Slope changes**: the decay that stops at each future end-time, applied
//!   as the global checkpoint crosses it.
//!
//! Bias is stored in amount-seconds (`amount * remaining`) rather than in
//! weight units, which makes the decay law exact: dividing by
//! `MAX_LOCK_DURATION` happens only when a weight is read.

pub mod engine;
pub mod point;

pub use engine::{CheckpointEngine, CheckpointProgress};
pub use point::{Contribution, GlobalPoint, UserPoint};
