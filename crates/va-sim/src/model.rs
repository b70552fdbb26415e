//! Model adapter contract and the single-owner host around it.

use std::collections::BTreeMap;
use std::thread::{self, ThreadId};

use va_core::PointValue;

use crate::error::{ModelResult, SimError, SimResult};

/// Computational model the coordinator drives.
///
/// Both calls fail with an identifier-specific [`crate::ModelError`] when an
/// identifier is unknown or a value is rejected. Implementations need not be
/// reentrant: the coordinator calls them from one thread only.
pub trait ModelAdapter: Send {
    /// Read current values for `names`.
    fn get(&mut self, names: &[String]) -> ModelResult<BTreeMap<String, PointValue>>;

    /// Apply new values; any re-evaluation is the adapter's responsibility.
    fn set(&mut self, values: &BTreeMap<String, PointValue>) -> ModelResult<()>;
}

impl<M: ModelAdapter + ?Sized> ModelAdapter for Box<M> {
    fn get(&mut self, names: &[String]) -> ModelResult<BTreeMap<String, PointValue>> {
        (**self).get(names)
    }

    fn set(&mut self, values: &BTreeMap<String, PointValue>) -> ModelResult<()> {
        (**self).set(values)
    }
}

/// Owns a model adapter and pins it to the first thread that uses it.
///
/// Any call from another thread fails with
/// [`SimError::ConcurrencyViolation`] without reaching the adapter.
pub struct ModelHost {
    model: Box<dyn ModelAdapter>,
    owner: Option<ThreadId>,
}

impl ModelHost {
    pub fn new(model: Box<dyn ModelAdapter>) -> Self {
        Self { model, owner: None }
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    fn check_thread(&mut self) -> SimResult<()> {
        let caller = thread::current().id();
        match self.owner {
            None => {
                self.owner = Some(caller);
                Ok(())
            }
            Some(owner) if owner == caller => Ok(()),
            Some(owner) => Err(SimError::ConcurrencyViolation {
                owner: format!("{:?}", owner),
                caller: format!("{:?}", caller),
            }),
        }
    }

    pub fn get(&mut self, names: &[String]) -> SimResult<BTreeMap<String, PointValue>> {
        self.check_thread()?;
        Ok(self.model.get(names)?)
    }

    pub fn set(&mut self, values: &BTreeMap<String, PointValue>) -> SimResult<()> {
        self.check_thread()?;
        Ok(self.model.set(values)?)
    }
}
