//! Pointwise (1x1) channel mixing on channel-first fields (batch, channels, n).

use {
    super::tensors::{join, Tensors},
    ndarray::{linalg::general_mat_mul, Array1, Array2, Array3, ArrayView3, Axis, Zip},
    rand::Rng,
    rayon::prelude::*,
    std::f64::consts::PI,
};

/// GELU, tanh approximation.
pub fn gelu(x: f64) -> f64 {
    0.5 * x * (1.0 + ((2.0 / PI).sqrt() * (x + 0.044_715 * x.powi(3))).tanh())
}

pub fn gelu_derivative(x: f64) -> f64 {
    let c = (2.0 / PI).sqrt();
    let t = (c * (x + 0.044_715 * x.powi(3))).tanh();
    0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * c * (1.0 + 3.0 * 0.044_715 * x * x)
}

/// Applies GELU to `pre` and returns the gradient with respect to `pre` given
/// the gradient `dy` of the activated output.
pub fn gelu_backward(pre: ArrayView3<f64>, dy: ArrayView3<f64>) -> Array3<f64> {
    let mut dx = Array3::zeros(pre.raw_dim());
    Zip::from(&mut dx)
        .and(&pre)
        .and(&dy)
        .par_for_each(|dx, &pre, &dy| *dx = dy * gelu_derivative(pre));
    dx
}

/// 1x1 convolution: y[b, o, t] = sum_i weight[o, i] x[b, i, t] + bias[o]
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    /// (out, in)
    pub weight: Array2<f64>,
    /// (out)
    pub bias: Array1<f64>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(in_channels: usize, out_channels: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (in_channels as f64).sqrt();

        Self {
            weight: Array2::from_shape_fn((out_channels, in_channels), |_| {
                rng.gen_range(-bound..bound)
            }),
            bias: Array1::from_shape_fn(out_channels, |_| rng.gen_range(-bound..bound)),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_channels(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: ArrayView3<f64>) -> Array3<f64> {
        let (batch, cin, n) = x.dim();
        assert_eq!(self.in_channels(), cin);

        let mut y = Array3::zeros((batch, self.out_channels(), n));
        let bias = self.bias.view().insert_axis(Axis(1));

        y.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut y, x)| {
                y.assign(&bias);
                general_mat_mul(1.0, &self.weight, &x, 1.0, &mut y);
            });

        y
    }

    /// Returns the gradient with respect to `x` and the parameter gradients.
    pub fn backward(&self, x: ArrayView3<f64>, dy: ArrayView3<f64>) -> (Array3<f64>, Linear) {
        assert_eq!(x.len_of(Axis(0)), dy.len_of(Axis(0)));

        let mut dx = Array3::zeros(x.raw_dim());
        let mut grad = self.zeroed();

        for (x, dy) in x.axis_iter(Axis(0)).zip(dy.axis_iter(Axis(0))) {
            general_mat_mul(1.0, &dy, &x.t(), 1.0, &mut grad.weight);
            grad.bias += &dy.sum_axis(Axis(1));
        }

        dx.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(dy.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut dx, dy)| {
                general_mat_mul(1.0, &self.weight.t(), &dy, 0.0, &mut dx);
            });

        (dx, grad)
    }
}

impl Tensors for Linear {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ndarray::ArrayViewD<f64>)) {
        f(join(prefix, "weight"), self.weight.view().into_dyn());
        f(join(prefix, "bias"), self.bias.view().into_dyn());
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ndarray::ArrayViewMutD<f64>)) {
        f(join(prefix, "weight"), self.weight.view_mut().into_dyn());
        f(join(prefix, "bias"), self.bias.view_mut().into_dyn());
    }
}

/// Two pointwise projections with a GELU in between.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    pub fc1: Linear,
    pub fc2: Linear,
}

impl Mlp {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        mid_channels: usize,
        rng: &mut R,
    ) -> Self {
        let fc1 = Linear::new(in_channels, mid_channels, rng);
        let fc2 = Linear::new(mid_channels, out_channels, rng);
        Self { fc1, fc2 }
    }

    pub fn forward(&self, x: ArrayView3<f64>) -> Array3<f64> {
        let h = self.fc1.forward(x).mapv_into(gelu);
        self.fc2.forward(h.view())
    }

    pub fn backward(&self, x: ArrayView3<f64>, dy: ArrayView3<f64>) -> (Array3<f64>, Mlp) {
        let pre = self.fc1.forward(x);
        let h = pre.mapv(gelu);

        let (dh, fc2) = self.fc2.backward(h.view(), dy);
        let dpre = gelu_backward(pre.view(), dh.view());
        let (dx, fc1) = self.fc1.backward(x, dpre.view());

        (dx, Mlp { fc1, fc2 })
    }
}

impl Tensors for Mlp {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ndarray::ArrayViewD<f64>)) {
        self.fc1.visit(&join(prefix, "fc1"), f);
        self.fc2.visit(&join(prefix, "fc2"), f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ndarray::ArrayViewMutD<f64>)) {
        self.fc1.visit_mut(&join(prefix, "fc1"), f);
        self.fc2.visit_mut(&join(prefix, "fc2"), f);
    }
}
