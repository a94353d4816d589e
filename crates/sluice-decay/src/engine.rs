//! The checkpoint engine.
//!
//! Maintains global and per-record checkpoint histories plus the schedule of
//! future slope changes, and answers weight queries at any time.
//!
//! Every time-walking loop here is bounded per call by `max_replay_steps`
//! epoch buckets:
//! - [`CheckpointEngine::checkpoint`] stops early and reports how far it got;
//!   calling it again resumes from there.
//! - [`CheckpointEngine::total_weight_at`] refuses replays longer than the
//!   bound with [`TemporalError::ReplayBoundExceeded`].
//!
//! Mutation ordering: [`CheckpointEngine::record_change`] requires the
//! global checkpoint to already sit at `now`. Weight reads issued after a
//! change in the same second observe the change, because the change itself
//! writes the checkpoint at `now`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sluice_core::constants::EPOCH_DURATION;
use sluice_core::epoch::epoch_start;
use sluice_core::error::{ConservationError, EscrowError, TemporalError};
use sluice_core::types::{LockedBalance, RecordId};

use crate::point::{decayed_bias, weight_from_bias, Contribution, GlobalPoint, UserPoint};

/// Outcome of one bounded [`CheckpointEngine::checkpoint`] pass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointProgress {
    /// Timestamp of the latest global point after this pass.
    pub reached: u64,
    /// Whether `reached` equals the requested time.
    pub caught_up: bool,
    /// Epoch buckets walked in this pass.
    pub steps: u64,
}

/// Global and per-record decay checkpoints.
#[derive(Clone, Debug, bincode::Encode, bincode::Decode)]
pub struct CheckpointEngine {
    /// Append-only; never empty (starts with a genesis point).
    global: Vec<GlobalPoint>,
    /// Append-only per record.
    users: HashMap<RecordId, Vec<UserPoint>>,
    /// Epoch-aligned time → slope that stops decaying there.
    slope_changes: BTreeMap<u64, i128>,
    next_sequence: u64,
    max_replay_steps: u64,
}

impl CheckpointEngine {
    /// Create an engine whose history starts at `genesis` with zero weight.
    pub fn new(genesis: u64, max_replay_steps: u64) -> Self {
        Self {
            global: vec![GlobalPoint {
                timestamp: genesis,
                ..GlobalPoint::default()
            }],
            users: HashMap::new(),
            slope_changes: BTreeMap::new(),
            next_sequence: 1,
            max_replay_steps,
        }
    }

    pub fn set_max_replay_steps(&mut self, steps: u64) {
        self.max_replay_steps = steps;
    }

    pub fn max_replay_steps(&self) -> u64 {
        self.max_replay_steps
    }

    /// The latest global point.
    pub fn last_point(&self) -> GlobalPoint {
        // `global` is seeded with a genesis point and only grows.
        self.global[self.global.len() - 1]
    }

    pub fn global_history(&self) -> &[GlobalPoint] {
        &self.global
    }

    pub fn user_history(&self, id: RecordId) -> &[UserPoint] {
        self.users.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Net slope scheduled to stop decaying at `t`.
    pub fn slope_change_at(&self, t: u64) -> i128 {
        self.slope_changes.get(&t).copied().unwrap_or(0)
    }

    /// All scheduled slope changes, ascending by time.
    pub fn slope_changes(&self) -> impl Iterator<Item = (u64, i128)> + '_ {
        self.slope_changes.iter().map(|(t, s)| (*t, *s))
    }

    fn bump_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    /// Advance the global checkpoint toward `now`, walking at most
    /// `max_replay_steps` epoch buckets and appending one point per bucket.
    ///
    /// # Errors
    ///
    /// [`TemporalError::ClockRegression`] when `now` precedes the latest point.
    pub fn checkpoint(&mut self, now: u64) -> Result<CheckpointProgress, EscrowError> {
        let mut point = self.last_point();
        if now < point.timestamp {
            return Err(TemporalError::ClockRegression {
                now,
                last: point.timestamp,
            }
            .into());
        }

        let mut t_i = epoch_start(point.timestamp);
        let mut steps = 0;
        while point.timestamp < now && steps < self.max_replay_steps {
            t_i = t_i.saturating_add(EPOCH_DURATION);
            let mut d_slope = 0;
            if t_i >= now {
                if t_i == now {
                    d_slope = self.slope_change_at(t_i);
                }
                t_i = now;
            } else {
                d_slope = self.slope_change_at(t_i);
            }

            point.bias = decayed_bias(point.bias, point.slope, point.timestamp, t_i);
            point.slope = (point.slope - d_slope).max(0);
            point.timestamp = t_i;
            point.sequence = self.bump_sequence();
            self.global.push(point);
            steps += 1;
        }

        let caught_up = point.timestamp == now;
        if caught_up {
            debug!(reached = point.timestamp, steps, "global checkpoint advanced");
        } else {
            warn!(reached = point.timestamp, now, steps, "global checkpoint still behind");
        }
        Ok(CheckpointProgress {
            reached: point.timestamp,
            caught_up,
            steps,
        })
    }

    /// Fail unless the global checkpoint sits exactly at `now`.
    pub fn ensure_caught_up(&self, now: u64) -> Result<(), TemporalError> {
        let reached = self.last_point().timestamp;
        if now < reached {
            return Err(TemporalError::ClockRegression { now, last: reached });
        }
        if reached != now {
            return Err(TemporalError::CheckpointBehind { reached, now });
        }
        Ok(())
    }

    /// Record that `id` changed from `old` to `new` at `now`.
    ///
    /// Applies the contribution delta to a new global point, moves the
    /// scheduled slope change from `old.end` to `new.end`, and appends a user
    /// point. Only end-times strictly after `now` are (un)scheduled: earlier
    /// ones have already been crossed by the global checkpoint.
    ///
    /// All arithmetic is done before anything is written.
    ///
    /// # Errors
    ///
    /// - [`TemporalError::CheckpointBehind`] / [`TemporalError::ClockRegression`]
    ///   when the global checkpoint is not at `now`
    /// - [`ConservationError`] when the aggregate would overflow or go negative
    pub fn record_change(
        &mut self,
        id: RecordId,
        old: &LockedBalance,
        new: &LockedBalance,
        now: u64,
    ) -> Result<(), EscrowError> {
        self.ensure_caught_up(now)?;

        let old_c = Contribution::at(old, now)?;
        let new_c = Contribution::at(new, now)?;
        let last = self.last_point();

        let bias = last
            .bias
            .checked_sub(old_c.bias)
            .and_then(|b| b.checked_add(new_c.bias))
            .ok_or(ConservationError::ArithmeticOverflow)?;
        if bias < 0 {
            return Err(ConservationError::NegativeBias(bias).into());
        }
        let slope = last
            .slope
            .checked_sub(old_c.slope)
            .and_then(|s| s.checked_add(new_c.slope))
            .ok_or(ConservationError::ArithmeticOverflow)?;
        if slope < 0 {
            return Err(ConservationError::NegativeBias(slope).into());
        }
        let permanent_lock_total = last
            .permanent_lock_total
            .checked_sub(old_c.permanent)
            .and_then(|p| p.checked_add(new_c.permanent))
            .ok_or(ConservationError::ArithmeticOverflow)?;

        let mut schedule: Vec<(u64, i128)> = Vec::with_capacity(2);
        if old_c.slope != 0 {
            schedule.push((old.end, self.slope_change_at(old.end) - old_c.slope));
        }
        if new_c.slope != 0 {
            let base = match schedule.first() {
                Some(&(t, pending)) if t == new.end => pending,
                _ => self.slope_change_at(new.end),
            };
            let updated = base
                .checked_add(new_c.slope)
                .ok_or(ConservationError::ArithmeticOverflow)?;
            schedule.retain(|(t, _)| *t != new.end);
            schedule.push((new.end, updated));
        }

        for (t, change) in schedule {
            if change == 0 {
                self.slope_changes.remove(&t);
            } else {
                self.slope_changes.insert(t, change);
            }
        }

        let global_seq = self.bump_sequence();
        self.global.push(GlobalPoint {
            bias,
            slope,
            timestamp: now,
            sequence: global_seq,
            permanent_lock_total,
        });

        let user_seq = self.bump_sequence();
        self.users.entry(id).or_default().push(UserPoint {
            bias: new_c.bias,
            slope: new_c.slope,
            timestamp: now,
            sequence: user_seq,
            permanent: new_c.permanent,
        });

        debug!(record = %id, amount = new.amount, end = new.end, permanent = new.is_permanent, "recorded lock change");
        Ok(())
    }

    /// Weight of record `id` at time `t`, from the latest user point at or
    /// before `t`. Zero when the record had no point by then.
    pub fn weight_at(&self, id: RecordId, t: u64) -> u128 {
        self.user_weight(id, t, |p| p.timestamp <= t)
    }

    /// Weight of record `id` as it enters second `t`: the latest user point
    /// strictly before `t`, extrapolated to `t`. Changes written at `t`
    /// itself are not seen, so the value is final once the clock reaches `t`.
    pub fn weight_entering(&self, id: RecordId, t: u64) -> u128 {
        self.user_weight(id, t, |p| p.timestamp < t)
    }

    fn user_weight(&self, id: RecordId, t: u64, before: impl Fn(&UserPoint) -> bool) -> u128 {
        let Some(history) = self.users.get(&id) else {
            return 0;
        };
        let idx = history.partition_point(before);
        if idx == 0 {
            return 0;
        }
        history[idx - 1].weight_at(t)
    }

    /// Total weight at time `t`.
    ///
    /// Starts from the latest global point at or before `t` and replays
    /// scheduled slope changes bucket by bucket up to `t`.
    ///
    /// # Errors
    ///
    /// [`TemporalError::ReplayBoundExceeded`] when reaching `t` would take
    /// more than `max_replay_steps` buckets; run [`checkpoint`](Self::checkpoint)
    /// first.
    pub fn total_weight_at(&self, t: u64) -> Result<u128, EscrowError> {
        self.replay_total(t, self.global.partition_point(|p| p.timestamp <= t))
    }

    /// Total weight as it enters second `t`, the aggregate counterpart of
    /// [`weight_entering`](Self::weight_entering).
    ///
    /// # Errors
    ///
    /// As for [`total_weight_at`](Self::total_weight_at).
    pub fn total_weight_entering(&self, t: u64) -> Result<u128, EscrowError> {
        self.replay_total(t, self.global.partition_point(|p| p.timestamp < t))
    }

    /// Replay from the global point just before index `idx` up to `t`.
    fn replay_total(&self, t: u64, idx: usize) -> Result<u128, EscrowError> {
        if idx == 0 {
            return Ok(0);
        }
        let start = self.global[idx - 1];
        let mut bias = start.bias;
        let mut slope = start.slope;
        let mut ts = start.timestamp;
        let mut t_i = epoch_start(ts);
        let mut steps = 0;

        while ts < t {
            if steps == self.max_replay_steps {
                return Err(TemporalError::ReplayBoundExceeded {
                    from: start.timestamp,
                    to: t,
                    max_steps: self.max_replay_steps,
                }
                .into());
            }
            t_i = t_i.saturating_add(EPOCH_DURATION);
            let d_slope = if t_i > t {
                t_i = t;
                0
            } else {
                self.slope_change_at(t_i)
            };
            bias = decayed_bias(bias, slope, ts, t_i);
            slope = (slope - d_slope).max(0);
            ts = t_i;
            steps += 1;
        }

        Ok(weight_from_bias(bias) + start.permanent_lock_total)
    }
}
