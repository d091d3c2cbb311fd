//! Gaussian random fields on a periodic 1D grid, used to draw initial
//! conditions.
//!
//! A field is synthesised in Fourier space: every wavenumber k receives an
//! independent standard complex normal coefficient scaled by
//!
//!   sqrt_eig[k] = size sqrt(2) sigma (4 pi^2 k^2 + tau^2)^(-alpha/2)
//!
//! and the real part of the inverse transform is returned. alpha sets the
//! smoothness, tau the inverse correlation length and sigma the amplitude.
//! The k = 0 weight is zero, so every sample has zero mean.

use {
    crate::{
        error::{Error, Result},
        fft::Fft1d,
        utils::ensure_finite,
    },
    ndarray::{Array1, Array2, Axis},
    num_complex::Complex64,
    rand::Rng,
    rand_distr::{Distribution, StandardNormal},
    rayon::prelude::*,
    serde::{Deserialize, Serialize},
    std::f64::consts::PI,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Boundary {
    Periodic,
}

#[derive(Debug, Clone)]
pub struct GaussianRandomField {
    pub alpha: f64,
    pub tau: f64,
    pub sigma: f64,
    pub boundary: Boundary,
    sqrt_eig: Array1<f64>,
    fft: Fft1d,
}

impl GaussianRandomField {
    pub fn new(size: usize, alpha: f64, tau: f64, sigma: f64, boundary: Boundary) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("random field size must be positive".to_string()));
        }
        if !(alpha.is_finite() && tau.is_finite() && sigma.is_finite()) {
            return Err(Error::Config(format!(
                "random field parameters must be finite, got alpha {}, tau {}, sigma {}",
                alpha, tau, sigma
            )));
        }

        let fft = Fft1d::new(size);
        let scale = size as f64 * 2.0f64.sqrt() * sigma;

        let mut sqrt_eig = fft
            .wavenumbers()
            .mapv(|k| scale * (4.0 * PI * PI * k * k + tau * tau).powf(-alpha / 2.0));
        sqrt_eig[0] = 0.0;

        ensure_finite("random field spectrum", &sqrt_eig)?;

        Ok(Self {
            alpha,
            tau,
            sigma,
            boundary,
            sqrt_eig,
            fft,
        })
    }

    pub fn size(&self) -> usize {
        self.fft.len()
    }

    pub fn sqrt_eig(&self) -> &Array1<f64> {
        &self.sqrt_eig
    }

    fn coefficients<R: Rng + ?Sized>(&self, rng: &mut R) -> Array1<Complex64> {
        self.sqrt_eig.mapv(|s| {
            let re: f64 = StandardNormal.sample(rng);
            let im: f64 = StandardNormal.sample(rng);
            Complex64::new(s * re, s * im)
        })
    }

    /// Draws one field of `size` points.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array1<f64>> {
        let u = self.fft.ifft_real(self.coefficients(rng).view());
        ensure_finite("random field sample", &u)?;
        Ok(u)
    }

    /// Draws `count` fields as the rows of a (count, size) array. Coefficients
    /// are drawn in row order, so the result matches `count` calls to
    /// `sample` on the same generator.
    pub fn sample_batch<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Result<Array2<f64>> {
        let coefficients = (0..count)
            .map(|_| self.coefficients(rng))
            .collect::<Vec<_>>();

        let mut out = Array2::zeros((count, self.size()));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(coefficients.par_iter())
            .for_each(|(mut row, xs)| row.assign(&self.fft.ifft_real(xs.view())));

        ensure_finite("random field samples", &out)?;
        Ok(out)
    }
}
