//! Shared-memory robust column-wise tree grower.

use crate::data::ColMatrix;
use crate::error::TrainError;
use crate::training::{create_evaluator, Builder, GradientPair, SplitEvaluator, TrainParam};
use crate::tree::RegTree;
use crate::updater::TreeUpdater;

/// Grows each tree with a [`Builder`] over the full column matrix.
///
/// When several trees are grown in one call their leaf weights are averaged
/// by dividing the learning rate by the tree count, so the ensemble update
/// keeps the configured step size.
pub struct RobustColMaker {
    param: TrainParam,
    spliteval: Box<dyn SplitEvaluator>,
}

impl RobustColMaker {
    pub fn new(param: TrainParam) -> Result<Self, TrainError> {
        param.validate()?;
        let spliteval = create_evaluator(&param.split_evaluator, &param)?;
        Ok(Self { param, spliteval })
    }
}

impl TreeUpdater for RobustColMaker {
    fn update(
        &mut self,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        trees: &mut [RegTree],
    ) -> Result<(), TrainError> {
        if trees.is_empty() {
            return Ok(());
        }
        let mut param = self.param.clone();
        param.learning_rate = self.param.learning_rate / trees.len() as f32;
        for (i, tree) in trees.iter_mut().enumerate() {
            // Trees in one batch draw distinct subsamples.
            param.seed = self.param.seed.wrapping_add(i as u64);
            let mut builder = Builder::new(param.clone(), self.spliteval.clone_evaluator());
            builder.update(gpair, matrix, tree)?;
        }
        Ok(())
    }
}
