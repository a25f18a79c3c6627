//! Nadam optimizer
//!
//! Adam with Nesterov momentum (Dozat, 2016) and the momentum warm-up
//! schedule `u_t = beta_1 * (1 - 0.5 * 0.96^(t * schedule_decay))`, plugged
//! into Burn through `SimpleOptimizer` so that `OptimizerAdaptor` handles
//! parameter bookkeeping.

use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, SimpleOptimizer},
    record::Record,
    tensor::{
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
    LearningRate,
};

use crate::model::config::OptimizerSettings;

/// Nadam configuration.
#[derive(Config, Debug)]
pub struct NadamConfig {
    /// Decay of the first moment.
    #[config(default = 0.9)]
    pub beta_1: f32,
    /// Decay of the second moment.
    #[config(default = 0.999)]
    pub beta_2: f32,
    /// Added to the denominator for numerical stability.
    #[config(default = 1e-7)]
    pub epsilon: f32,
    /// Decay of the momentum warm-up schedule.
    #[config(default = 0.004)]
    pub schedule_decay: f32,
}

impl NadamConfig {
    /// Initialize the optimizer for module `M`.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> OptimizerAdaptor<Nadam, M, B> {
        OptimizerAdaptor::from(Nadam {
            beta_1: self.beta_1,
            beta_2: self.beta_2,
            epsilon: self.epsilon,
            schedule_decay: self.schedule_decay,
        })
    }
}

impl From<&OptimizerSettings> for NadamConfig {
    fn from(settings: &OptimizerSettings) -> Self {
        NadamConfig::new()
            .with_beta_1(settings.beta_1)
            .with_beta_2(settings.beta_2)
            .with_epsilon(settings.epsilon)
            .with_schedule_decay(settings.schedule_decay)
    }
}

/// Nadam optimizer.
#[derive(Clone, Debug)]
pub struct Nadam {
    beta_1: f32,
    beta_2: f32,
    epsilon: f32,
    schedule_decay: f32,
}

impl Nadam {
    /// Momentum coefficient `u_t` at step `t` (1-based)
    fn momentum_at(&self, time: usize) -> f64 {
        let decay = 0.96f64.powf(time as f64 * self.schedule_decay as f64);
        self.beta_1 as f64 * (1.0 - 0.5 * decay)
    }
}

/// Nadam state.
#[derive(Record, Clone)]
pub struct NadamState<B: Backend, const D: usize> {
    /// Steps taken so far.
    pub time: usize,
    /// Product of the momentum coefficients `u_1 * ... * u_time`.
    pub momentum_schedule: f64,
    /// First moment estimate.
    pub moment_1: Tensor<B, D>,
    /// Second moment estimate.
    pub moment_2: Tensor<B, D>,
}

impl<B: Backend> SimpleOptimizer<B> for Nadam {
    type State<const D: usize> = NadamState<B, D>;

    fn step<const D: usize>(
        &self,
        lr: LearningRate,
        tensor: Tensor<B, D>,
        grad: Tensor<B, D>,
        state: Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        let factor_1 = 1.0 - self.beta_1;
        let factor_2 = 1.0 - self.beta_2;

        let mut state = match state {
            Some(mut state) => {
                state.moment_1 = state
                    .moment_1
                    .mul_scalar(self.beta_1)
                    .add(grad.clone().mul_scalar(factor_1));
                state.moment_2 = state
                    .moment_2
                    .mul_scalar(self.beta_2)
                    .add(grad.clone().powi_scalar(2).mul_scalar(factor_2));
                state.time += 1;
                state
            }
            None => NadamState {
                time: 1,
                momentum_schedule: 1.0,
                moment_1: grad.clone().mul_scalar(factor_1),
                moment_2: grad.clone().powi_scalar(2).mul_scalar(factor_2),
            },
        };

        let momentum = self.momentum_at(state.time);
        let momentum_next = self.momentum_at(state.time + 1);
        state.momentum_schedule *= momentum;
        let schedule_next = state.momentum_schedule * momentum_next;

        // Nesterov look-ahead: blend the corrected gradient with next step's momentum
        let current = grad.mul_scalar((1.0 - momentum) / (1.0 - state.momentum_schedule));
        let ahead = state
            .moment_1
            .clone()
            .mul_scalar(momentum_next / (1.0 - schedule_next));
        let moment_1_bar = current.add(ahead);

        let moment_2_hat = state
            .moment_2
            .clone()
            .div_scalar(1.0 - self.beta_2.powi(state.time as i32));

        let delta = moment_1_bar
            .div(moment_2_hat.sqrt().add_scalar(self.epsilon))
            .mul_scalar(lr);

        (tensor - delta, Some(state))
    }

    fn to_device<const D: usize>(mut state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        state.moment_1 = state.moment_1.to_device(device);
        state.moment_2 = state.moment_2.to_device(device);
        state
    }
}
