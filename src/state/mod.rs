//! Shared State Module
//!
//! Lock-free publication of the adaptive parameter set. Readers take one
//! immutable snapshot per cycle; the learner swaps in a complete new set.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

use crate::params::ParameterSet;

/// Atomically published parameter snapshots
pub struct SharedParameters {
    current: ArcSwap<ParameterSet>,
}

impl SharedParameters {
    pub fn new(params: ParameterSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(params),
        }
    }

    /// Immutable snapshot for one cycle
    pub fn snapshot(&self) -> Arc<ParameterSet> {
        self.current.load_full()
    }

    /// Replace the published set in one step
    pub fn publish(&self, params: ParameterSet) {
        let version = params.version;
        self.current.store(Arc::new(params));
        info!("Parameter set v{} published", version);
    }

    /// Publish only if nobody published since `expected` was read. Returns false on a lost race.
    pub fn publish_if_current(&self, expected: &Arc<ParameterSet>, params: ParameterSet) -> bool {
        let version = params.version;
        let previous = self.current.compare_and_swap(expected, Arc::new(params));
        let swapped = Arc::ptr_eq(&*previous, expected);
        if swapped {
            info!("Parameter set v{} published", version);
        }
        swapped
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new(ParameterSet::default())
    }
}
