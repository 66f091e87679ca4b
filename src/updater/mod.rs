//! Tree updaters and their process-wide registry.
//!
//! Updaters are looked up by name, the way a driver selects them from
//! configuration: `robust_grow_colmaker` is the shared-memory grower,
//! `robust_distcol` the distributed column-partitioned variant. The registry
//! is populated once on first use and immutable afterwards.

mod colmaker;
mod distcol;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::data::ColMatrix;
use crate::error::TrainError;
use crate::training::{GradientPair, TrainParam};
use crate::tree::RegTree;

pub use colmaker::RobustColMaker;
pub use distcol::RobustDistColMaker;

/// Grows or rewrites trees in place from the current gradients.
pub trait TreeUpdater: Send {
    fn update(
        &mut self,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        trees: &mut [RegTree],
    ) -> Result<(), TrainError>;
}

type UpdaterFactory = fn(TrainParam) -> Result<Box<dyn TreeUpdater>, TrainError>;

fn registry() -> &'static BTreeMap<&'static str, UpdaterFactory> {
    static REGISTRY: OnceLock<BTreeMap<&'static str, UpdaterFactory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: BTreeMap<&'static str, UpdaterFactory> = BTreeMap::new();
        map.insert("robust_grow_colmaker", |param| {
            Ok(Box::new(RobustColMaker::new(param)?))
        });
        map.insert("robust_distcol", |param| {
            Ok(Box::new(RobustDistColMaker::new(param)?))
        });
        map
    })
}

/// Instantiate the updater registered under `name`.
pub fn create_updater(name: &str, param: TrainParam) -> Result<Box<dyn TreeUpdater>, TrainError> {
    match registry().get(name) {
        Some(factory) => factory(param),
        None => Err(TrainError::UnknownUpdater(name.to_string())),
    }
}

/// Registered updater names, ascending.
pub fn updater_names() -> impl Iterator<Item = &'static str> {
    registry().keys().copied()
}
