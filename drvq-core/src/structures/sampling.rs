//! Weighted sampling without replacement over a population histogram

use rand::Rng;

/// Rejection attempts before falling back to an exact scan
const MAX_REJECTIONS: usize = 32;

/// Draws indices with probability proportional to their weight, never
/// returning an index twice. Once every weighted index is taken, draws fall
/// back to uniform over the remaining indices, and finally to uniform over
/// all indices.
#[derive(Debug, Clone)]
pub struct WeightedSampler {
    weights: Vec<f64>,
    cumulative: Vec<f64>,
    chosen: Vec<bool>,
    remaining_weight: f64,
    remaining: usize,
}

impl WeightedSampler {
    pub fn new(weights: Vec<f64>) -> Self {
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for &w in &weights {
            total += w.max(0.0);
            cumulative.push(total);
        }
        let remaining = weights.len();
        Self {
            weights,
            cumulative,
            chosen: vec![false; remaining],
            remaining_weight: total,
            remaining,
        }
    }

    pub fn from_counts(counts: &[u32]) -> Self {
        Self::new(counts.iter().map(|&c| c as f64).collect())
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn is_chosen(&self, index: usize) -> bool {
        self.chosen[index]
    }

    /// Exclude an index from future draws
    pub fn mark(&mut self, index: usize) {
        if !self.chosen[index] {
            self.chosen[index] = true;
            self.remaining -= 1;
            self.remaining_weight -= self.weights[index].max(0.0);
        }
    }

    /// Draw one index and mark it chosen
    ///
    /// # Panics
    /// Panics if the sampler has no indices.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        assert!(!self.is_empty(), "sampling from an empty population");
        let index = if self.has_weight() {
            self.draw_weighted(rng)
        } else if self.remaining > 0 {
            self.draw_uniform_unchosen(rng)
        } else {
            rng.random_range(0..self.len())
        };
        self.mark(index);
        index
    }

    /// Draw `k` distinct indices where possible
    pub fn draw_many<R: Rng + ?Sized>(&mut self, k: usize, rng: &mut R) -> Vec<usize> {
        (0..k).map(|_| self.draw(rng)).collect()
    }

    fn has_weight(&self) -> bool {
        // Guard against drift from repeated subtraction
        self.remaining_weight > self.cumulative.last().copied().unwrap_or(0.0) * 1e-12
            && self.remaining > 0
    }

    fn draw_weighted<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        for _ in 0..MAX_REJECTIONS {
            let u = rng.random::<f64>() * total;
            let index = self.cumulative.partition_point(|&c| c <= u);
            if index < self.len() && !self.chosen[index] && self.weights[index] > 0.0 {
                return index;
            }
        }

        // Exact draw over what is left
        let mut u = rng.random::<f64>() * self.remaining_weight;
        let mut last = None;
        for (index, &w) in self.weights.iter().enumerate() {
            if self.chosen[index] || w <= 0.0 {
                continue;
            }
            last = Some(index);
            if u < w {
                return index;
            }
            u -= w;
        }
        match last {
            Some(index) => index,
            None => self.draw_uniform_unchosen(rng),
        }
    }

    fn draw_uniform_unchosen<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let mut nth = rng.random_range(0..self.remaining);
        for (index, &taken) in self.chosen.iter().enumerate() {
            if taken {
                continue;
            }
            if nth == 0 {
                return index;
            }
            nth -= 1;
        }
        unreachable!("remaining count out of sync with chosen flags")
    }
}
