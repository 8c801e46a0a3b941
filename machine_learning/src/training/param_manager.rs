use std::mem;

use crate::{MlErr, Result, optimization::Optimizer};

/// Manages the parameters of a model and the buffer their gradient is written to.
///
/// Both are flat buffers split in one slice per layer. The slices can be iterated sequentially
/// in order through the `FrontIter` (forward pass) or in reverse through the `BackIter`
/// (backward pass).
#[derive(Debug, Clone, PartialEq)]
pub struct ParamManager {
    params: Vec<f32>,
    grad: Vec<f32>,
    layer_sizes: Vec<usize>,
}

impl ParamManager {
    /// Creates a new `ParamManager`.
    ///
    /// # Arguments
    /// * `params` - The parameters of every layer, concatenated.
    /// * `layer_sizes` - The amount of parameters of each layer.
    ///
    /// # Returns
    /// A new `ParamManager` or an error if the sizes don't add up to the amount of parameters.
    pub fn new(params: Vec<f32>, layer_sizes: Vec<usize>) -> Result<Self> {
        let expected: usize = layer_sizes.iter().sum();

        if params.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected,
            });
        }

        Ok(Self {
            grad: vec![0.; params.len()],
            params,
            layer_sizes,
        })
    }

    /// Returns the total amount of parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    /// Creates a new iterator over each layer's parameters, first layer first.
    pub fn front(&self) -> FrontIter<'_> {
        FrontIter {
            params: &self.params,
            layer_sizes: &self.layer_sizes,
        }
    }

    /// Creates a new iterator over each layer's parameters and gradient, last layer first.
    pub fn back(&mut self) -> BackIter<'_> {
        BackIter {
            params: &self.params,
            grad: &mut self.grad,
            layer_sizes: &self.layer_sizes,
        }
    }

    /// Zeros out the gradient.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Applies the gradient onto the parameters.
    pub fn optimize<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&self.grad, &mut self.params)
    }
}

/// The layers' parameter iterator.
pub struct FrontIter<'pm> {
    params: &'pm [f32],
    layer_sizes: &'pm [usize],
}

impl<'pm> Iterator for FrontIter<'pm> {
    type Item = &'pm [f32];

    fn next(&mut self) -> Option<Self::Item> {
        let (&size, rest) = self.layer_sizes.split_first()?;
        self.layer_sizes = rest;

        let (head, tail) = self.params.split_at(size);
        self.params = tail;
        Some(head)
    }
}

/// The reversed layers' parameter and gradient iterator.
pub struct BackIter<'pm> {
    params: &'pm [f32],
    grad: &'pm mut [f32],
    layer_sizes: &'pm [usize],
}

impl<'pm> Iterator for BackIter<'pm> {
    type Item = (&'pm [f32], &'pm mut [f32]);

    fn next(&mut self) -> Option<Self::Item> {
        let (&size, rest) = self.layer_sizes.split_last()?;
        self.layer_sizes = rest;

        let (params, params_tail) = self.params.split_at(self.params.len() - size);
        self.params = params;

        let grad = mem::take(&mut self.grad);
        let (grad, grad_tail) = grad.split_at_mut(grad.len() - size);
        self.grad = grad;

        Some((params_tail, grad_tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_an_invalid_manager_fails() {
        assert!(ParamManager::new(vec![1.0, 2.0], vec![1, 2]).is_err());
    }

    #[test]
    fn front_iterator() {
        let pm = ParamManager::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![1, 0, 3, 1]).unwrap();
        let mut front = pm.front();

        assert_eq!(front.next().unwrap(), [1.0]);
        assert_eq!(front.next().unwrap(), [] as [f32; 0]);
        assert_eq!(front.next().unwrap(), [2.0, 3.0, 4.0]);
        assert_eq!(front.next().unwrap(), [5.0]);
        assert!(front.next().is_none());
    }

    #[test]
    fn back_iterator() {
        let mut pm = ParamManager::new(vec![1.0, 2.0, 3.0, 4.0, 5.0], vec![1, 3, 1]).unwrap();
        let mut back = pm.back();

        let (params, grad) = back.next().unwrap();
        assert_eq!(params, [5.0]);
        grad[0] = 50.0;

        let (params, grad) = back.next().unwrap();
        assert_eq!(params, [2.0, 3.0, 4.0]);
        grad.copy_from_slice(&[20.0, 30.0, 40.0]);

        let (params, _) = back.next().unwrap();
        assert_eq!(params, [1.0]);
        assert!(back.next().is_none());

        assert_eq!(pm.grad(), [0.0, 20.0, 30.0, 40.0, 50.0]);
        pm.zero_grad();
        assert_eq!(pm.grad(), [0.0; 5]);
    }
}
