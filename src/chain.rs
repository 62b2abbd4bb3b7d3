//! Storage of walker positions, log probabilities and blobs across steps.

/// Walker positions and log probabilities indexed by (step, walker, parameter).
#[derive(Debug, Clone)]
pub struct Chain {
    num_walkers: usize,
    dim: usize,
    values: Vec<f64>,
    log_prob: Vec<f64>,
}

impl Chain {
    pub fn new(num_walkers: usize, dim: usize) -> Self {
        Chain {
            num_walkers,
            dim,
            values: Vec::new(),
            log_prob: Vec::new(),
        }
    }

    pub(crate) fn push_step(&mut self, positions: &[Box<[f64]>], log_prob: &[f64]) {
        assert!(positions.len() == self.num_walkers);
        assert!(log_prob.len() == self.num_walkers);
        for position in positions {
            assert!(position.len() == self.dim);
            self.values.extend_from_slice(position);
        }
        self.log_prob.extend_from_slice(log_prob);
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.log_prob.clear();
    }

    pub fn num_steps(&self) -> usize {
        self.log_prob.len() / self.num_walkers
    }

    pub fn num_walkers(&self) -> usize {
        self.num_walkers
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.log_prob.is_empty()
    }

    pub fn position(&self, step: usize, walker: usize) -> &[f64] {
        let start = (step * self.num_walkers + walker) * self.dim;
        &self.values[start..start + self.dim]
    }

    pub fn log_prob(&self, step: usize, walker: usize) -> f64 {
        self.log_prob[step * self.num_walkers + walker]
    }

    /// Positions of all walkers at one step.
    pub fn step(&self, step: usize) -> impl Iterator<Item = &[f64]> + '_ {
        let row = self.num_walkers * self.dim;
        self.values[step * row..(step + 1) * row].chunks_exact(self.dim)
    }

    /// Positions of all walkers at the last stored step.
    pub fn last_step(&self) -> Option<impl Iterator<Item = &[f64]> + '_> {
        let steps = self.num_steps();
        if steps == 0 {
            return None;
        }
        Some(self.step(steps - 1))
    }

    /// All stored positions, without step and walker structure.
    pub fn flatchain(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.dim)
    }

    /// Flattened samples of one parameter over all steps and walkers.
    pub fn parameter_values(&self, param: usize) -> Vec<f64> {
        self.flatchain().map(|point| point[param]).collect()
    }

    /// Samples of one parameter from the last-step ensemble.
    pub fn last_step_values(&self, param: usize) -> Vec<f64> {
        self.last_step()
            .map(|step| step.map(|point| point[param]).collect())
            .unwrap_or_default()
    }

    /// The trace of one parameter for one walker.
    pub fn walker_trace(&self, walker: usize, param: usize) -> Vec<f64> {
        (0..self.num_steps())
            .map(|step| self.position(step, walker)[param])
            .collect()
    }
}

/// Blobs indexed by (step, walker).
#[derive(Debug, Clone)]
pub struct BlobHistory<B> {
    steps: Vec<Vec<B>>,
}

impl<B> Default for BlobHistory<B> {
    fn default() -> Self {
        BlobHistory { steps: Vec::new() }
    }
}

impl<B> BlobHistory<B> {
    pub(crate) fn push_step(&mut self, blobs: Vec<B>) {
        self.steps.push(blobs);
    }

    pub(crate) fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, step: usize) -> &[B] {
        &self.steps[step]
    }

    pub fn last_step(&self) -> Option<&[B]> {
        self.steps.last().map(|blobs| blobs.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &[B]> + '_ {
        self.steps.iter().map(|blobs| blobs.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn two_step_chain() -> Chain {
        let mut chain = Chain::new(2, 3);
        let step0: Vec<Box<[f64]>> = vec![vec![0., 1., 2.].into(), vec![3., 4., 5.].into()];
        let step1: Vec<Box<[f64]>> = vec![vec![6., 7., 8.].into(), vec![9., 10., 11.].into()];
        chain.push_step(&step0, &[-1., -2.]);
        chain.push_step(&step1, &[-3., -4.]);
        chain
    }

    #[test]
    fn indexing() {
        let chain = two_step_chain();
        assert_eq!(chain.num_steps(), 2);
        assert_eq!(chain.position(1, 0), &[6., 7., 8.]);
        assert_eq!(chain.log_prob(1, 1), -4.);
        assert_eq!(chain.walker_trace(1, 2), vec![5., 11.]);
        assert_eq!(chain.parameter_values(0), vec![0., 3., 6., 9.]);
        assert_eq!(chain.last_step_values(1), vec![7., 10.]);
        assert_eq!(chain.flatchain().count(), 4);
    }

    #[test]
    fn clear_keeps_shape() {
        let mut chain = two_step_chain();
        chain.clear();
        assert!(chain.is_empty());
        assert!(chain.last_step().is_none());
        assert!(chain.last_step_values(0).is_empty());
        assert_eq!(chain.dim(), 3);
    }

    #[test]
    fn blob_history() {
        let mut blobs = BlobHistory::default();
        blobs.push_step(vec!["a", "b"]);
        blobs.push_step(vec!["c", "d"]);
        assert_eq!(blobs.last_step(), Some(&["c", "d"][..]));
        assert_eq!(blobs.step(0)[1], "b");
        assert_eq!(blobs.iter().count(), 2);
        blobs.clear();
        assert!(blobs.is_empty());
    }
}
