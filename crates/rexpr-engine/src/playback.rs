//! Replaying recorded history onto the data graph.
//!
//! For a target position `t`, every slot that appears anywhere in the
//! history gets the value it held at `t`:
//!
//! - forward: the new value of its last transition at or before `t`, or
//!   the old value of its first transition when all of them come later;
//! - backward: the old value of its first transition at or after `t`, or
//!   the new value of its last transition when all of them come earlier.
//!
//! All writes happen with the coordinator suspended, so dependent
//! expressions settle once.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::accessor::Accessor;
use crate::error::{EngineError, PlaybackError};
use crate::state::StateManager;
use crate::tracker::{ChangeRecord, History};
use crate::transaction::TransactionCoordinator;
use crate::value::{Key, ObjId, Value};

/// Where to move the data graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTarget {
    /// Position in the history.
    Index(usize),
    /// Wall-clock milliseconds, matched against batch timestamps.
    Timestamp(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

fn resolve_target(target: PlaybackTarget, direction: Direction, history: &History) -> Result<usize, PlaybackError> {
    match target {
        PlaybackTarget::Index(index) if index < history.len() => Ok(index),
        PlaybackTarget::Index(index) => Err(PlaybackError::IndexOutOfRange {
            index,
            len: history.len(),
        }),
        PlaybackTarget::Timestamp(ts) => {
            let position = match direction {
                Direction::Forward => history.position_at_or_before(ts),
                Direction::Backward => history.position_at_or_after(ts),
            };
            position.ok_or(PlaybackError::TimestampOutOfRange(ts))
        }
    }
}

/// The writes that put every recorded slot at its value for `target`,
/// in order of first appearance.
pub(crate) fn plan(
    target: PlaybackTarget,
    direction: Direction,
    history: &History,
) -> Result<Vec<(Accessor, Value)>, PlaybackError> {
    let position = resolve_target(target, direction, history)?;

    let mut order: Vec<(ObjId, Key)> = Vec::new();
    let mut chosen: HashMap<(ObjId, Key), (Accessor, Value, bool)> = HashMap::new();
    for (at, batch) in history.iter().enumerate() {
        for record in &batch.changes {
            let slot = record.identifier.slot();
            let entry = chosen.entry(slot.clone()).or_insert_with(|| {
                order.push(slot);
                let accessor = Accessor::new(record.identifier.context.clone(), record.identifier.key.clone());
                (accessor, Value::Undefined, false)
            });
            choose(entry, record, at, position, direction);
        }
    }
    Ok(order
        .into_iter()
        .filter_map(|slot| chosen.remove(&slot))
        .map(|(accessor, value, _)| (accessor, value))
        .collect())
}

/// Fold one transition into the slot's pick. The flag marks a pick that
/// came from the preferred side of `position` and is final or overwritable
/// depending on direction.
fn choose(
    entry: &mut (Accessor, Value, bool),
    record: &ChangeRecord,
    at: usize,
    position: usize,
    direction: Direction,
) {
    let (_, value, settled) = entry;
    match direction {
        Direction::Forward => {
            if at <= position {
                *value = record.new.clone();
                *settled = true;
            } else if !*settled {
                // Only later transitions: keep the earliest old value.
                *value = record.old.clone();
                *settled = true;
            }
        }
        Direction::Backward => {
            if at >= position {
                if !*settled {
                    *value = record.old.clone();
                    *settled = true;
                }
            } else {
                *value = record.new.clone();
            }
        }
    }
}

/// Apply `plan` with the coordinator suspended; returns the number of
/// slots written.
pub(crate) fn apply(
    coordinator: &Rc<TransactionCoordinator>,
    state: &StateManager,
    writes: Vec<(Accessor, Value)>,
) -> Result<usize, PlaybackError> {
    let count = writes.len();
    coordinator.suspend();
    for (accessor, value) in writes {
        if let Err(error) = accessor.write(state, value) {
            warn!(key = %accessor.key, %error, "playback write rejected");
            coordinator.record_error(error.into());
        }
    }
    match coordinator.resume() {
        Ok(()) => {
            debug!(writes = count, "playback applied");
            Ok(count)
        }
        Err(EngineError::Stalled { steps }) => {
            warn!(steps, "playback did not settle");
            Err(PlaybackError::SettleTimeout { steps })
        }
        Err(error) => {
            coordinator.record_error(error);
            Ok(count)
        }
    }
}
