//! Training progress logging.

/// How much training progress to print.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No output.
    #[default]
    Silent,
    /// One line per expanded level.
    Info,
    /// Per-level detail including candidate gains.
    Debug,
}

/// Writes progress lines to stderr so they never mix with model output.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        self.verbosity >= level
    }

    pub fn start_tree(&self, n_rows: usize, n_active: usize, n_features: usize) {
        if self.enabled(Verbosity::Info) {
            eprintln!(
                "[robustboost] growing tree: {} rows ({} active), {} features",
                n_rows, n_active, n_features
            );
        }
    }

    pub fn level(&self, depth: u32, expanded: usize, split: usize) {
        if self.enabled(Verbosity::Info) {
            eprintln!(
                "[robustboost] depth {}: {} nodes expanded, {} split",
                depth, expanded, split
            );
        }
    }

    pub fn node_split(&self, nid: usize, fid: u32, threshold: f32, loss_chg: f32) {
        if self.enabled(Verbosity::Debug) {
            eprintln!(
                "[robustboost]   node {} splits on f{} < {} (loss_chg {})",
                nid, fid, threshold, loss_chg
            );
        }
    }

    pub fn finish_tree(&self, num_nodes: usize) {
        if self.enabled(Verbosity::Info) {
            eprintln!("[robustboost] tree finished with {} nodes", num_nodes);
        }
    }
}
