use crate::Result;

/// An optimization algorithm, it dictates how the parameters move given their gradient.
pub trait Optimizer {
    /// Updates the parameters according to the algorithm's learning rule.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `params` - The parameters that are going to be modified.
    ///
    /// # Returns
    /// An error if `grad` and `params` differ in length.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        (**self).update_params(grad, params)
    }
}
