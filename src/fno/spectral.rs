//! Spectral convolutions: transform, mix a truncated band of modes across
//! channels with learned complex weights, transform back.

use {
    super::tensors::{join, Tensors},
    crate::{
        error::{Error, Result},
        fft::Fft1d,
    },
    ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMutD, Axis},
    num_complex::Complex64,
    rand::Rng,
    rayon::prelude::*,
};

const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };

/// Complex weights of shape (in, out, modes) held as a real/imaginary pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeWeights {
    pub re: Array3<f64>,
    pub im: Array3<f64>,
}

impl ModeWeights {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        modes: usize,
        rng: &mut R,
    ) -> Self {
        let scale = 1.0 / (in_channels * out_channels) as f64;
        let shape = (in_channels, out_channels, modes);

        Self {
            re: Array3::from_shape_fn(shape, |_| scale * rng.gen::<f64>()),
            im: Array3::from_shape_fn(shape, |_| scale * rng.gen::<f64>()),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.re.len_of(Axis(0))
    }

    pub fn out_channels(&self) -> usize {
        self.re.len_of(Axis(1))
    }

    pub fn modes(&self) -> usize {
        self.re.len_of(Axis(2))
    }

    fn weight(&self, i: usize, o: usize, k: usize) -> Complex64 {
        Complex64::new(self.re[[i, o, k]], self.im[[i, o, k]])
    }

    /// Per-mode channel contraction ys[o, k] = sum_i xs[i, k] w[i, o, k].
    /// Modes are never mixed with each other.
    pub fn mix(&self, xs: ArrayView2<Complex64>) -> Array2<Complex64> {
        let (cin, cout, modes) = self.re.dim();
        assert_eq!((cin, modes), xs.dim());

        let mut ys = Array2::from_elem((cout, modes), ZERO);
        for i in 0..cin {
            for o in 0..cout {
                for k in 0..modes {
                    ys[[o, k]] += xs[[i, k]] * self.weight(i, o, k);
                }
            }
        }
        ys
    }

    /// Adjoint of `mix`: returns dxs and accumulates the weight gradient.
    pub fn mix_backward(
        &self,
        xs: ArrayView2<Complex64>,
        dys: ArrayView2<Complex64>,
        grad: &mut ModeWeights,
    ) -> Array2<Complex64> {
        let (cin, cout, modes) = self.re.dim();

        let mut dxs = Array2::from_elem((cin, modes), ZERO);
        for i in 0..cin {
            for o in 0..cout {
                for k in 0..modes {
                    let dy = dys[[o, k]];
                    dxs[[i, k]] += dy * self.weight(i, o, k).conj();

                    let dw = xs[[i, k]].conj() * dy;
                    grad.re[[i, o, k]] += dw.re;
                    grad.im[[i, o, k]] += dw.im;
                }
            }
        }
        dxs
    }
}

impl Tensors for ModeWeights {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>)) {
        f(join(prefix, "re"), self.re.view().into_dyn());
        f(join(prefix, "im"), self.im.view().into_dyn());
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>)) {
        f(join(prefix, "re"), self.re.view_mut().into_dyn());
        f(join(prefix, "im"), self.im.view_mut().into_dyn());
    }
}

/// Which band of the input spectrum a spectral convolution reads.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Band {
    /// The lowest modes, written back in place.
    Low,
    /// The highest modes, written into the lowest output slots and passed
    /// through a complex ReLU.
    High,
}

/// Checks a mode count against the Nyquist bound of an input of length n.
pub fn check_modes(modes: usize, n: usize) -> Result<()> {
    let limit = n / 2 + 1;
    if modes > limit {
        return Err(Error::ModeOverflow { modes, n, limit });
    }
    Ok(())
}

fn check_input(weights: &ModeWeights, x: &ArrayView3<f64>) -> Result<()> {
    let (_, cin, n) = x.dim();
    if n == 0 {
        return Err(Error::shape("spectral convolution grid", "at least one point", n));
    }
    if cin != weights.in_channels() {
        return Err(Error::shape(
            "spectral convolution input channels",
            weights.in_channels(),
            cin,
        ));
    }
    check_modes(weights.modes(), n)
}

fn complex_relu(c: Complex64) -> Complex64 {
    Complex64::new(c.re.max(0.0), c.im.max(0.0))
}

fn forward_band(weights: &ModeWeights, band: Band, x: ArrayView3<f64>) -> Array3<f64> {
    let (batch, _, n) = x.dim();
    let fft = Fft1d::shared(n);
    let modes = weights.modes();
    let first = match band {
        Band::Low => 0,
        Band::High => fft.modes() - modes,
    };

    let mut y = Array3::zeros((batch, weights.out_channels(), n));

    y.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(x.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut y, x)| {
            let xs = spectra(&fft, x, first, modes);
            let mut ys = weights.mix(xs.view());
            if band == Band::High {
                ys.mapv_inplace(complex_relu);
            }

            let mut full = Array2::from_elem((weights.out_channels(), fft.modes()), ZERO);
            full.slice_mut(s![.., ..modes]).assign(&ys);
            for (row, y) in full.outer_iter().zip(y.outer_iter_mut()) {
                fft.spctop_into(row, y);
            }
        });

    y
}

fn backward_band(
    weights: &ModeWeights,
    band: Band,
    x: ArrayView3<f64>,
    dy: ArrayView3<f64>,
) -> (Array3<f64>, ModeWeights) {
    let (_, cin, n) = x.dim();
    let fft = Fft1d::shared(n);
    let modes = weights.modes();
    let first = match band {
        Band::Low => 0,
        Band::High => fft.modes() - modes,
    };
    let normfac = 1.0 / n as f64;

    let mut dx = Array3::zeros(x.raw_dim());

    let grad = dx
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(x.axis_iter(Axis(0)).into_par_iter())
        .zip(dy.axis_iter(Axis(0)).into_par_iter())
        .map(|((mut dx, x), dy)| {
            let mut grad = weights.zeroed();
            let xs = spectra(&fft, x, first, modes);

            // Adjoint of spctop on the retained output slots
            let mut dys = spectra(&fft, dy, 0, modes);
            for ((_, k), d) in dys.indexed_iter_mut() {
                *d *= fft.multiplicity(k) * normfac;
            }

            if band == Band::High {
                let ys = weights.mix(xs.view());
                for (d, y) in dys.iter_mut().zip(ys.iter()) {
                    let re = if y.re > 0.0 { d.re } else { 0.0 };
                    let im = if y.im > 0.0 { d.im } else { 0.0 };
                    *d = Complex64::new(re, im);
                }
            }

            let dxs = weights.mix_backward(xs.view(), dys.view(), &mut grad);

            // Adjoint of ptospc on the band that was read
            let mut full = Array2::from_elem((cin, fft.modes()), ZERO);
            for ((i, k), d) in dxs.indexed_iter() {
                full[[i, first + k]] = *d * (n as f64 / fft.multiplicity(first + k));
            }
            for (row, dx) in full.outer_iter().zip(dx.outer_iter_mut()) {
                fft.spctop_into(row, dx);
            }

            grad
        })
        .reduce(
            || weights.zeroed(),
            |mut a, b| {
                a.re += &b.re;
                a.im += &b.im;
                a
            },
        );

    (dx, grad)
}

/// Forward transforms every channel of `x` (channels, n) and keeps modes
/// first..first + modes.
fn spectra(fft: &Fft1d, x: ArrayView2<f64>, first: usize, modes: usize) -> Array2<Complex64> {
    let mut xs = Array2::from_elem((x.nrows(), modes), ZERO);
    for (row, mut out) in x.outer_iter().zip(xs.outer_iter_mut()) {
        let full = fft.ptospc(row);
        out.assign(&full.slice(s![first..first + modes]));
    }
    xs
}

/// Fourier layer: ptospc, linear transform of the lowest modes, spctop.
/// All higher modes are dropped, so the parameter count does not depend on
/// the resolution of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralConv1d {
    pub weights: ModeWeights,
}

impl SpectralConv1d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        modes: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: ModeWeights::new(in_channels, out_channels, modes, rng),
        }
    }

    pub fn modes(&self) -> usize {
        self.weights.modes()
    }

    /// (batch, in, n) -> (batch, out, n). Fails with `ModeOverflow` when the
    /// input is too short to hold the retained modes.
    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        check_input(&self.weights, &x)?;
        Ok(forward_band(&self.weights, Band::Low, x))
    }

    pub fn backward(
        &self,
        x: ArrayView3<f64>,
        dy: ArrayView3<f64>,
    ) -> Result<(Array3<f64>, SpectralConv1d)> {
        check_input(&self.weights, &x)?;
        let (dx, weights) = backward_band(&self.weights, Band::Low, x, dy);
        Ok((dx, SpectralConv1d { weights }))
    }
}

impl Tensors for SpectralConv1d {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>)) {
        self.weights.visit(prefix, f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>)) {
        self.weights.visit_mut(prefix, f);
    }
}

/// Convection branch: reads the highest modes of the input spectrum, mixes
/// them across channels, writes them into the lowest output modes and
/// applies a complex ReLU before returning to physical space.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvectionConv1d {
    pub weights: ModeWeights,
}

impl ConvectionConv1d {
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        modes: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            weights: ModeWeights::new(in_channels, out_channels, modes, rng),
        }
    }

    pub fn modes(&self) -> usize {
        self.weights.modes()
    }

    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        check_input(&self.weights, &x)?;
        Ok(forward_band(&self.weights, Band::High, x))
    }

    pub fn backward(
        &self,
        x: ArrayView3<f64>,
        dy: ArrayView3<f64>,
    ) -> Result<(Array3<f64>, ConvectionConv1d)> {
        check_input(&self.weights, &x)?;
        let (dx, weights) = backward_band(&self.weights, Band::High, x, dy);
        Ok((dx, ConvectionConv1d { weights }))
    }
}

impl Tensors for ConvectionConv1d {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>)) {
        self.weights.visit(prefix, f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>)) {
        self.weights.visit_mut(prefix, f);
    }
}
