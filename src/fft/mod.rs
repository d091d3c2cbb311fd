//! Fourier transform module.
//! Thin wrapper around `rustfft` plans for transforms of real periodic data of
//! a fixed length n. Plans are built once per length and kept in an `Fft1d`
//! which may be shared between threads.
//!
//! Conventions match numpy:
//! 1) ptospc(x)  :
//!      Physical -> spectral. Unnormalised real-input transform returning the
//!      n/2+1 non-negative frequency coefficients.
//! 2) spctop(xs) :
//!      Spectral -> physical. Inverse of ptospc, normalised by 1/n. The
//!      imaginary parts of the zero and (even n) Nyquist coefficients are
//!      ignored, as they cannot be represented by a real signal.
//! 3) ifft_real(xs) :
//!      Full length inverse complex transform, normalised by 1/n, keeping
//!      only the real part.
//!
//! The backward passes of the learned operators need the adjoints of the
//! first two transforms; `multiplicity` gives the number of conjugate
//! coefficients each retained mode stands for.

#[cfg(test)]
mod test;

use {
    lazy_static::lazy_static,
    ndarray::{Array1, ArrayView1, ArrayViewMut1},
    num_complex::Complex64,
    rustfft::{Fft, FftPlanner},
    std::{
        collections::HashMap,
        f64::consts::PI,
        fmt,
        sync::{Arc, Mutex, PoisonError},
    },
};

lazy_static! {
    static ref PLANS: Mutex<HashMap<usize, Arc<Fft1d>>> = Mutex::new(HashMap::new());
}

#[derive(Clone)]
pub struct Fft1d {
    n: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for Fft1d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fft1d").field("n", &self.n).finish()
    }
}

impl Fft1d {
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "transform length must be positive");

        let mut planner = FftPlanner::new();

        Self {
            n,
            forward: planner.plan_fft_forward(n),
            inverse: planner.plan_fft_inverse(n),
        }
    }

    /// Plans for length n, built on first use and shared by every caller
    /// afterwards.
    pub fn shared(n: usize) -> Arc<Self> {
        let mut plans = PLANS.lock().unwrap_or_else(PoisonError::into_inner);
        plans
            .entry(n)
            .or_insert_with(|| Arc::new(Self::new(n)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.n
    }

    /// Number of coefficients returned by `ptospc`, the Nyquist limited mode count.
    pub fn modes(&self) -> usize {
        self.n / 2 + 1
    }

    /// 1 for the zero and (even n) Nyquist modes, 2 for every other retained mode.
    pub fn multiplicity(&self, k: usize) -> f64 {
        if k == 0 || (self.n % 2 == 0 && k == self.n / 2) {
            1.0
        } else {
            2.0
        }
    }

    /// Signed integer wavenumbers in transform order: 0, 1, .., -2, -1.
    pub fn wavenumbers(&self) -> Array1<f64> {
        let n = self.n;
        Array1::from_shape_fn(n, |k| {
            if k <= (n - 1) / 2 {
                k as f64
            } else {
                k as f64 - n as f64
            }
        })
    }

    /// Wavenumbers 2*pi*k/length of the modes returned by `ptospc`.
    pub fn angular_wavenumbers(&self, length: f64) -> Array1<f64> {
        let sc = 2.0 * PI / length;
        Array1::from_shape_fn(self.modes(), |k| sc * k as f64)
    }

    /// Physical -> spectral transform of a real periodic signal.
    pub fn ptospc(&self, x: ArrayView1<f64>) -> Array1<Complex64> {
        assert_eq!(self.n, x.len());

        let mut buf = x.iter().map(|&v| Complex64::new(v, 0.0)).collect::<Vec<_>>();
        self.forward.process(&mut buf);
        buf.truncate(self.modes());

        Array1::from(buf)
    }

    /// Spectral -> physical transform, writing the n real values into `x`.
    pub fn spctop_into(&self, xs: ArrayView1<Complex64>, mut x: ArrayViewMut1<f64>) {
        let n = self.n;
        assert_eq!(self.modes(), xs.len());
        assert_eq!(n, x.len());

        let mut buf = vec![Complex64::new(0.0, 0.0); n];
        buf[0] = Complex64::new(xs[0].re, 0.0);
        for k in 1..(n + 1) / 2 {
            buf[k] = xs[k];
            buf[n - k] = xs[k].conj();
        }
        if n % 2 == 0 && n > 1 {
            buf[n / 2] = Complex64::new(xs[n / 2].re, 0.0);
        }

        self.inverse.process(&mut buf);

        let normfac = 1.0 / n as f64;
        for (x, b) in x.iter_mut().zip(buf.iter()) {
            *x = b.re * normfac;
        }
    }

    pub fn spctop(&self, xs: ArrayView1<Complex64>) -> Array1<f64> {
        let mut x = Array1::zeros(self.n);
        self.spctop_into(xs, x.view_mut());
        x
    }

    /// Inverse complex transform of all n coefficients, returning the real part.
    pub fn ifft_real(&self, xs: ArrayView1<Complex64>) -> Array1<f64> {
        assert_eq!(self.n, xs.len());

        let mut buf = xs.to_vec();
        self.inverse.process(&mut buf);

        let normfac = 1.0 / self.n as f64;
        buf.iter().map(|b| b.re * normfac).collect()
    }
}
