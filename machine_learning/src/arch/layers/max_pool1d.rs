use ndarray::prelude::*;

/// Downsamples the step axis keeping the maximum of each window of `pool_size` steps.
///
/// The stride equals the pool size, trailing steps that don't fill a window are dropped.
#[derive(Debug, Clone)]
pub struct MaxPool1d {
    pool_size: usize,

    // Forward metadata
    in_shape: (usize, usize, usize),
    argmax: Array3<usize>,
}

impl MaxPool1d {
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            in_shape: (0, 0, 0),
            argmax: Array3::zeros((0, 0, 0)),
        }
    }

    pub fn out_steps(&self, steps: usize) -> usize {
        steps / self.pool_size
    }

    pub fn forward(&mut self, x: Array3<f32>) -> Array3<f32> {
        let (b, steps, channels) = x.dim();
        let out_steps = self.out_steps(steps);

        let mut y = Array3::zeros((b, out_steps, channels));
        let mut argmax = Array3::zeros((b, out_steps, channels));

        for ((n, t, c), y) in y.indexed_iter_mut() {
            let start = t * self.pool_size;
            let (mut best, mut best_t) = (f32::NEG_INFINITY, start);

            for i in start..start + self.pool_size {
                if x[[n, i, c]] > best {
                    best = x[[n, i, c]];
                    best_t = i;
                }
            }

            *y = best;
            argmax[[n, t, c]] = best_t;
        }

        self.in_shape = x.dim();
        self.argmax = argmax;
        y
    }

    /// Routes each delta to the step that won its window.
    pub fn backward(&mut self, d: Array3<f32>) -> Array3<f32> {
        let mut dx = Array3::zeros(self.in_shape);

        for ((n, t, c), &d) in d.indexed_iter() {
            dx[[n, self.argmax[[n, t, c]], c]] += d;
        }

        dx
    }
}
