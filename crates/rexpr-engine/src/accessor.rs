//! Uniform slot writes.
//!
//! Writes from expression handles and from playback go through
//! [`Accessor`] instead of touching containers directly. A slot that holds
//! a stream is fed through the stream; anything else is an observable slot
//! write on the state manager.

use crate::error::EvalResult;
use crate::state::StateManager;
use crate::value::{Key, Obj, Value};

#[derive(Debug, Clone)]
pub struct Accessor {
    pub context: Obj,
    pub key: Key,
}

impl Accessor {
    pub fn new(context: Obj, key: Key) -> Self {
        Self { context, key }
    }

    /// The raw slot content, async sources included.
    pub fn read(&self, state: &StateManager) -> Value {
        state.get_value(&self.context, &self.key)
    }

    pub fn write(&self, state: &StateManager, value: Value) -> EvalResult<()> {
        match self.read(state) {
            Value::Stream(stream) => {
                stream.next(value);
                Ok(())
            }
            _ => state.set_value(&self.context, &self.key, value),
        }
    }
}
