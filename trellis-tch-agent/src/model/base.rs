use anyhow::Result;
use tch::nn;

/// Neural network module built on a path of a [`VarStore`] from a configuration.
///
/// Modules of an agent are built on different paths of a single [`VarStore`], so that the
/// parameters of all of them are optimized, saved and loaded together.
///
/// [`VarStore`]: https://docs.rs/tch/0.16.0/tch/nn/struct.VarStore.html
pub trait SubModel: Sized {
    /// Configuration from which the module is constructed.
    type Config;

    /// Input of the module.
    type Input;

    /// Output of the module.
    type Output;

    /// Builds the module with its variables under `path`.
    fn build(path: &nn::Path, config: Self::Config) -> Result<Self>;

    /// A generalized forward function.
    fn forward(&self, input: &Self::Input) -> Self::Output;
}
