//! CNN Model Architecture for Spoken Language Classification
//!
//! A deliberately tiny network over 192x192 spectrograms:
//! one 3x3 convolution, ELU, 2x2 max pooling, then two dense layers.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation, backend::Backend, Tensor},
};

/// Configuration for the LanguageClassifier CNN model
#[derive(Config, Debug)]
pub struct LanguageClassifierConfig {
    /// Number of output classes
    #[config(default = "3")]
    pub num_classes: usize,

    /// Input image size (square images)
    #[config(default = "192")]
    pub input_size: usize,

    /// Number of input channels
    #[config(default = "1")]
    pub in_channels: usize,

    /// Filters in the convolution
    #[config(default = "1")]
    pub conv_filters: usize,

    /// Units in the hidden dense layer
    #[config(default = "1")]
    pub dense_units: usize,

    /// ELU saturation for negative inputs
    #[config(default = "1.0")]
    pub elu_alpha: f64,
}

impl LanguageClassifierConfig {
    /// Side length after the 2x2 pooling
    pub fn pooled_size(&self) -> usize {
        self.input_size / 2
    }

    /// Width of the flattened feature vector
    pub fn flattened_len(&self) -> usize {
        self.pooled_size() * self.pooled_size() * self.conv_filters
    }

    /// Initialize a model with this configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> LanguageClassifier<B> {
        LanguageClassifier::new(self, device)
    }
}

/// Exponential linear unit: `x` for `x > 0`, `alpha * (exp(x) - 1)` otherwise
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f64) -> Tensor<B, D> {
    let negative = x.clone().clamp_max(0.0).exp().sub_scalar(1.0).mul_scalar(alpha);
    activation::relu(x) + negative
}

/// Spoken language classifier
///
/// Architecture:
/// - Conv2d 3x3, same padding
/// - ELU
/// - MaxPool 2x2, stride 2
/// - Flatten
/// - Dense to `dense_units`, ELU
/// - Dense to `num_classes` (logits)
#[derive(Module, Debug)]
pub struct LanguageClassifier<B: Backend> {
    pub conv: Conv2d<B>,
    pub pool: MaxPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,

    num_classes: usize,
    input_size: usize,
    conv_filters: usize,
    elu_alpha: f64,
}

impl<B: Backend> LanguageClassifier<B> {
    /// Create a new LanguageClassifier from configuration
    pub fn new(config: &LanguageClassifierConfig, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([config.in_channels, config.conv_filters], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let fc1 = LinearConfig::new(config.flattened_len(), config.dense_units).init(device);
        let fc2 = LinearConfig::new(config.dense_units, config.num_classes).init(device);

        Self {
            conv,
            pool,
            fc1,
            fc2,
            num_classes: config.num_classes,
            input_size: config.input_size,
            conv_filters: config.conv_filters,
            elu_alpha: config.elu_alpha,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 1, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv.forward(x);
        let x = elu(x, self.elu_alpha);
        let x = self.pool.forward(x);

        // Flatten: [B, C, H, W] -> [B, C * H * W]
        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = elu(x, self.elu_alpha);
        self.fc2.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let logits = self.forward(x);
        activation::softmax(logits, 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Layer table in the familiar Keras layout
    pub fn summary(&self) -> String {
        let size = self.input_size;
        let pooled = size / 2;
        let flat = pooled * pooled * self.conv_filters;
        let hidden = self.fc1.weight.dims()[1];

        let rows = [
            ("conv2d (Conv2D)", shape(&[size, size, self.conv_filters]), self.conv.num_params()),
            ("elu (ELU)", shape(&[size, size, self.conv_filters]), 0),
            ("max_pooling2d (MaxPooling2D)", shape(&[pooled, pooled, self.conv_filters]), 0),
            ("flatten (Flatten)", shape(&[flat]), 0),
            ("dense (Dense)", shape(&[hidden]), self.fc1.num_params()),
            ("elu_1 (ELU)", shape(&[hidden]), 0),
            ("dense_1 (Dense)", shape(&[self.num_classes]), self.fc2.num_params()),
            ("softmax (Softmax)", shape(&[self.num_classes]), 0),
        ];

        let rule = "_".repeat(65);
        let mut out = String::new();
        out.push_str("Model: \"language_classifier\"\n");
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("{:<29}{:<26}{}\n", "Layer (type)", "Output Shape", "Param #"));
        out.push_str(&"=".repeat(65));
        out.push('\n');
        for (i, (name, output, params)) in rows.iter().enumerate() {
            out.push_str(&format!("{:<29}{:<26}{}\n", name, output, params));
            if i + 1 < rows.len() {
                out.push_str(&rule);
                out.push('\n');
            }
        }
        out.push_str(&"=".repeat(65));
        out.push('\n');
        let total = self.num_params();
        out.push_str(&format!("Total params: {}\n", crate::utils::format_number(total)));
        out.push_str(&format!("Trainable params: {}\n", crate::utils::format_number(total)));
        out.push_str("Non-trainable params: 0\n");
        out.push_str(&rule);
        out
    }
}

fn shape(dims: &[usize]) -> String {
    let inner: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
    format!("(None, {})", inner.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_language_classifier_output_shape() {
        let device = Default::default();
        let model = LanguageClassifierConfig::new().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 1, 192, 192], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 3]);
        assert_eq!(model.num_classes(), 3);
    }

    #[test]
    fn test_default_parameter_count() {
        let device = Default::default();
        let model = LanguageClassifierConfig::new().init::<TestBackend>(&device);

        // conv 1*1*3*3 + 1, dense 9216 + 1, dense 1*3 + 3
        assert_eq!(model.num_params(), 10 + 9217 + 6);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = LanguageClassifierConfig::new()
            .with_input_size(8)
            .with_conv_filters(2)
            .with_dense_units(4)
            .init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::ones([3, 1, 8, 8], &device);
        let probs = model.forward_softmax(input);
        assert_eq!(probs.dims(), [3, 3]);

        let sums = probs.sum_dim(1).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_elu_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats(
            TensorData::new(vec![-2.0f32, 0.0, 1.5], [3]),
            &device,
        );
        let y = elu(x, 1.0).into_data().convert::<f32>().to_vec::<f32>().unwrap();

        assert!((y[0] - ((-2.0f32).exp() - 1.0)).abs() < 1e-6);
        assert_eq!(y[1], 0.0);
        assert_eq!(y[2], 1.5);
    }

    #[test]
    fn test_summary_lists_layers() {
        let device = Default::default();
        let model = LanguageClassifierConfig::new().init::<TestBackend>(&device);
        let summary = model.summary();

        assert!(summary.contains("(None, 96, 96, 1)"));
        assert!(summary.contains("(None, 9216)"));
        assert!(summary.contains("Total params: 9,233"));
    }
}
