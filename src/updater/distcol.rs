//! Distributed column-partitioned robust tree grower.
//!
//! Every worker holds all rows but only a slice of the feature columns. The
//! builder reduces per-node candidates and row re-routing bitmaps through the
//! attached [`Collective`], so all workers commit identical trees. After
//! growing, the configured pruner (an external collaborator, any
//! [`TreeUpdater`]) may collapse unprofitable splits, and row positions are
//! re-resolved against the pruned tree.

use std::sync::Arc;

use crate::collective::{Collective, SingleWorker};
use crate::data::ColMatrix;
use crate::error::TrainError;
use crate::training::{create_evaluator, Builder, GradientPair, SplitEvaluator, TrainParam};
use crate::tree::RegTree;
use crate::updater::TreeUpdater;

pub struct RobustDistColMaker {
    param: TrainParam,
    spliteval: Box<dyn SplitEvaluator>,
    collective: Arc<dyn Collective>,
    pruner: Option<Box<dyn TreeUpdater>>,
    /// Encoded row positions of the last grown tree.
    leaf_positions: Vec<i32>,
}

impl RobustDistColMaker {
    pub fn new(param: TrainParam) -> Result<Self, TrainError> {
        param.validate()?;
        let spliteval = create_evaluator(&param.split_evaluator, &param)?;
        Ok(Self {
            param,
            spliteval,
            collective: Arc::new(SingleWorker),
            pruner: None,
            leaf_positions: Vec::new(),
        })
    }

    /// Connect this worker to its peers.
    pub fn with_collective(mut self, collective: Arc<dyn Collective>) -> Self {
        self.collective = collective;
        self
    }

    /// Install the pruning pipeline stage run after each tree.
    pub fn with_pruner(mut self, pruner: Box<dyn TreeUpdater>) -> Self {
        self.pruner = Some(pruner);
        self
    }

    /// Final leaf position of every row after the last update, encoded.
    pub fn leaf_positions(&self) -> &[i32] {
        &self.leaf_positions
    }
}

impl TreeUpdater for RobustDistColMaker {
    fn update(
        &mut self,
        gpair: &[GradientPair],
        matrix: &ColMatrix,
        trees: &mut [RegTree],
    ) -> Result<(), TrainError> {
        if trees.len() != 1 {
            return Err(TrainError::SingleTreeOnly { got: trees.len() });
        }
        let mut builder = Builder::new(self.param.clone(), self.spliteval.clone_evaluator())
            .with_collective(Arc::clone(&self.collective));
        builder.update(gpair, matrix, &mut trees[0])?;

        if let Some(pruner) = &mut self.pruner {
            pruner.update(gpair, matrix, trees)?;
        }
        builder.update_position(matrix, &trees[0]);
        self.leaf_positions = builder.leaf_positions().to_vec();
        Ok(())
    }
}
