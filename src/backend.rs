//! Backend selection
//!
//! Training runs on the NdArray CPU backend unless the crate is built with the
//! `cuda` feature, in which case the first CUDA device is used.

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn_cuda::Cuda;

#[cfg(all(not(feature = "cuda"), any(feature = "ndarray", feature = "cpu")))]
pub type DefaultBackend = burn_ndarray::NdArray;

#[cfg(all(not(feature = "cuda"), not(feature = "ndarray"), not(feature = "cpu")))]
compile_error!("Enable one backend feature: `ndarray` (default) or `cuda`");

/// Backend with automatic differentiation, used for fitting
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device the pipeline runs on
pub type DefaultDevice = <DefaultBackend as Backend>::Device;

pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Short label for logs and the startup banner
pub fn backend_name() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA (GPU)"
    } else {
        "NdArray (CPU)"
    }
}
