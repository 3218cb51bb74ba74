use ndarray::{s, Array1, Array2, ArrayView2, Axis, Dimension, Zip, Array};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use super::forecast::{ModelConfig, SequenceRegressor};
use super::WindowSet;
use crate::error::{Error, Result};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;
const GRAD_CLIP_NORM: f64 = 5.0;

/// Training report after model fit
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub samples: usize,
    pub epochs: usize,
    pub final_loss: f64,
}

/// Trainable tensors. Gate blocks are laid out as [input, forget, cell, output].
#[derive(Debug, Clone)]
struct LstmParams {
    /// Input -> gates (4H)
    w_input: Array1<f64>,
    /// Hidden -> gates (H x 4H)
    w_hidden: Array2<f64>,
    /// Gate bias (4H)
    bias: Array1<f64>,
    /// Hidden -> output (H)
    w_out: Array1<f64>,
    /// Output bias (1)
    b_out: Array1<f64>,
}

impl LstmParams {
    fn init<R: Rng>(hidden: usize, rng: &mut R) -> Self {
        let gates = 4 * hidden;
        let input_limit = (6.0 / (1 + gates) as f64).sqrt();
        let hidden_limit = (6.0 / (hidden + gates) as f64).sqrt();
        let out_limit = (6.0 / (hidden + 1) as f64).sqrt();

        let mut bias = Array1::zeros(gates);
        bias.slice_mut(s![hidden..2 * hidden]).fill(1.0);

        Self {
            w_input: Array1::from_shape_fn(gates, |_| rng.gen_range(-input_limit..input_limit)),
            w_hidden: Array2::from_shape_fn((hidden, gates), |_| {
                rng.gen_range(-hidden_limit..hidden_limit)
            }),
            bias,
            w_out: Array1::from_shape_fn(hidden, |_| rng.gen_range(-out_limit..out_limit)),
            b_out: Array1::zeros(1),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w_input: Array1::zeros(self.w_input.raw_dim()),
            w_hidden: Array2::zeros(self.w_hidden.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
            w_out: Array1::zeros(self.w_out.raw_dim()),
            b_out: Array1::zeros(self.b_out.raw_dim()),
        }
    }

    fn norm(&self) -> f64 {
        let sq = |a: f64, v: &f64| a + v * v;
        (self.w_input.iter().fold(0.0, sq)
            + self.w_hidden.iter().fold(0.0, sq)
            + self.bias.iter().fold(0.0, sq)
            + self.w_out.iter().fold(0.0, sq)
            + self.b_out.iter().fold(0.0, sq))
        .sqrt()
    }

    fn scale(&mut self, factor: f64) {
        self.w_input *= factor;
        self.w_hidden *= factor;
        self.bias *= factor;
        self.w_out *= factor;
        self.b_out *= factor;
    }
}

/// Values kept from the forward pass of one time step.
struct StepCache {
    x: Array1<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

struct Adam {
    learning_rate: f64,
    step: i32,
    m: LstmParams,
    v: LstmParams,
}

impl Adam {
    fn new(params: &LstmParams, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            step: 0,
            m: params.zeros_like(),
            v: params.zeros_like(),
        }
    }

    fn update(&mut self, params: &mut LstmParams, grads: &LstmParams) {
        self.step += 1;
        let lr_t = self.learning_rate * (1.0 - ADAM_BETA2.powi(self.step)).sqrt()
            / (1.0 - ADAM_BETA1.powi(self.step));

        adam_step(&mut params.w_input, &grads.w_input, &mut self.m.w_input, &mut self.v.w_input, lr_t);
        adam_step(&mut params.w_hidden, &grads.w_hidden, &mut self.m.w_hidden, &mut self.v.w_hidden, lr_t);
        adam_step(&mut params.bias, &grads.bias, &mut self.m.bias, &mut self.v.bias, lr_t);
        adam_step(&mut params.w_out, &grads.w_out, &mut self.m.w_out, &mut self.v.w_out, lr_t);
        adam_step(&mut params.b_out, &grads.b_out, &mut self.m.b_out, &mut self.v.b_out, lr_t);
    }
}

fn adam_step<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
        });
}

/// Single-layer LSTM over a univariate window followed by a linear head,
/// regressing the next value of the series. Built, trained and dropped
/// within one forecast call.
pub struct LstmRegressor {
    hidden: usize,
    params: LstmParams,
    config: ModelConfig,
}

impl LstmRegressor {
    pub fn new<R: Rng>(config: ModelConfig, rng: &mut R) -> Self {
        Self {
            hidden: config.hidden_size,
            params: LstmParams::init(config.hidden_size, rng),
            config,
        }
    }

    fn forward(&self, inputs: ArrayView2<f64>) -> (Array1<f64>, Vec<StepCache>) {
        let batch = inputs.nrows();
        let hs = self.hidden;
        let mut h = Array2::<f64>::zeros((batch, hs));
        let mut c = Array2::<f64>::zeros((batch, hs));
        let mut caches = Vec::with_capacity(inputs.ncols());

        for x in inputs.columns() {
            let mut z = h.dot(&self.params.w_hidden);
            for (mut row, &xv) in z.rows_mut().into_iter().zip(x.iter()) {
                row.scaled_add(xv, &self.params.w_input);
                row += &self.params.bias;
            }

            let i = z.slice(s![.., 0..hs]).mapv(sigmoid);
            let f = z.slice(s![.., hs..2 * hs]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * hs..3 * hs]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * hs..]).mapv(sigmoid);

            let c_next = &f * &c + &i * &g;
            let tanh_c = c_next.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            caches.push(StepCache {
                x: x.to_owned(),
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                tanh_c,
            });
            h = h_next;
            c = c_next;
        }

        let output = h.dot(&self.params.w_out) + self.params.b_out[0];
        (output, caches)
    }

    /// Back-propagation through time for a mean-squared-error loss.
    fn backward(&self, caches: &[StepCache], output: &Array1<f64>, targets: &Array1<f64>) -> LstmParams {
        let hs = self.hidden;
        let batch = output.len();
        let mut grads = self.params.zeros_like();

        let d_out = (output - targets) * (2.0 / batch as f64);
        let h_last = match caches.last() {
            Some(last) => &last.o * &last.tanh_c,
            None => return grads,
        };

        grads.w_out = h_last.t().dot(&d_out);
        grads.b_out[0] = d_out.sum();

        let mut dh = d_out
            .view()
            .insert_axis(Axis(1))
            .dot(&self.params.w_out.view().insert_axis(Axis(0)));
        let mut dc = Array2::<f64>::zeros((batch, hs));

        for step in caches.iter().rev() {
            let d_o = &dh * &step.tanh_c;
            dc = dc + &dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v);

            let dz_i = &dc * &step.g * &step.i.mapv(|v| v * (1.0 - v));
            let dz_f = &dc * &step.c_prev * &step.f.mapv(|v| v * (1.0 - v));
            let dz_g = &dc * &step.i * &step.g.mapv(|v| 1.0 - v * v);
            let dz_o = d_o * &step.o.mapv(|v| v * (1.0 - v));

            let mut dz = Array2::<f64>::zeros((batch, 4 * hs));
            dz.slice_mut(s![.., 0..hs]).assign(&dz_i);
            dz.slice_mut(s![.., hs..2 * hs]).assign(&dz_f);
            dz.slice_mut(s![.., 2 * hs..3 * hs]).assign(&dz_g);
            dz.slice_mut(s![.., 3 * hs..]).assign(&dz_o);

            grads.w_input += &step.x.dot(&dz);
            grads.w_hidden += &step.h_prev.t().dot(&dz);
            grads.bias += &dz.sum_axis(Axis(0));

            dh = dz.dot(&self.params.w_hidden.t());
            dc = &dc * &step.f;
        }

        grads
    }

    /// Mini-batch Adam on shuffled windows for `config.epochs` passes.
    pub fn fit<R: Rng>(&mut self, data: &WindowSet, rng: &mut R) -> Result<TrainingReport> {
        if data.is_empty() {
            return Err(Error::NoData("no training windows".to_string()));
        }
        if data.window() == 0 {
            return Err(Error::invalid("window must be a positive integer"));
        }

        let epochs = self.config.epochs.max(1);
        let n = data.len();
        let batch_size = self.config.batch_size.max(1).min(n);
        let mut optimizer = Adam::new(&self.params, self.config.learning_rate);
        let mut order: Vec<usize> = (0..n).collect();
        let mut final_loss = f64::NAN;

        for epoch in 0..epochs {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;
            let mut batches = 0usize;

            for chunk in order.chunks(batch_size) {
                let x = data.inputs.select(Axis(0), chunk);
                let y = data.targets.select(Axis(0), chunk);

                let (output, caches) = self.forward(x.view());
                let loss = (&output - &y).mapv(|e| e * e).mean().unwrap_or(f64::NAN);
                if !loss.is_finite() {
                    return Err(Error::ModelUnavailable(
                        "training diverged (non-finite loss)".to_string(),
                    ));
                }

                let mut grads = self.backward(&caches, &output, &y);
                let norm = grads.norm();
                if norm > GRAD_CLIP_NORM {
                    grads.scale(GRAD_CLIP_NORM / norm);
                }
                optimizer.update(&mut self.params, &grads);

                epoch_loss += loss;
                batches += 1;
            }

            final_loss = epoch_loss / batches as f64;
            debug!("epoch {}/{} loss={:.6}", epoch + 1, epochs, final_loss);
        }

        Ok(TrainingReport {
            samples: n,
            epochs,
            final_loss,
        })
    }
}

impl SequenceRegressor for LstmRegressor {
    fn predict_next(&self, window: &[f64]) -> f64 {
        match ArrayView2::from_shape((1, window.len()), window) {
            Ok(view) => self.forward(view).0[0],
            Err(_) => f64::NAN,
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
