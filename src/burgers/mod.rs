//! Viscous Burgers equation u_t + u u_x = visc u_xx on a periodic domain,
//! advanced with a pseudo-spectral semi-implicit scheme. Used to produce the
//! ground truth of the training pairs.
//!
//! Every substep of size dt:
//!   1) transform u and differentiate in spectral space (i k u),
//!   2) form the explicit advection term -0.5 u u_x in physical space,
//!   3) transform u + dt (-0.5 u u_x) and divide each mode by the
//!      Crank-Nicolson factor 1 + 0.5 dt visc k^2,
//!   4) transform back.
//!
//! The derivative of the Nyquist mode (even n) is zeroed, which keeps the
//! discrete advection term orthogonal to u so that sum(u) is conserved.


use {
    crate::{
        error::{Error, Result},
        fft::Fft1d,
        utils::ensure_finite,
    },
    log::{debug, warn},
    ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip},
    num_complex::Complex64,
    rayon::prelude::*,
};

/// Denominators below this are treated as a breakdown of the implicit step.
pub const MIN_DENOMINATOR: f64 = 1.0E-6;

#[derive(Debug, Clone)]
pub struct BurgersSolver {
    pub length: f64,
    pub viscosity: f64,
    fft: Fft1d,
    /// k for every mode returned by `ptospc`, zero at Nyquist
    derivative: Array1<f64>,
    /// k^2 for every mode returned by `ptospc`
    k2: Array1<f64>,
}

/// Per-solve constants shared by every field of a batch.
struct Step {
    dt: f64,
    steps: usize,
    denominator: Array1<f64>,
}

impl BurgersSolver {
    pub fn new(n: usize, length: f64, viscosity: f64) -> Result<Self> {
        if n < 2 {
            return Err(Error::Config(format!(
                "solver needs at least 2 grid points, got {}",
                n
            )));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::Config(format!(
                "domain length must be positive, got {}",
                length
            )));
        }
        if !viscosity.is_finite() {
            return Err(Error::Config(format!(
                "viscosity must be finite, got {}",
                viscosity
            )));
        }

        let fft = Fft1d::new(n);
        let k = fft.angular_wavenumbers(length);
        let k2 = k.mapv(|k| k * k);

        let mut derivative = k;
        if n % 2 == 0 {
            derivative[n / 2] = 0.0;
        }

        Ok(Self {
            length,
            viscosity,
            fft,
            derivative,
            k2,
        })
    }

    pub fn len(&self) -> usize {
        self.fft.len()
    }

    pub fn dx(&self) -> f64 {
        self.length / self.len() as f64
    }

    fn plan(&self, time: f64, steps: usize) -> Result<Step> {
        if steps == 0 {
            return Err(Error::Config("time_steps must be positive".to_string()));
        }
        if !(time.is_finite() && time >= 0.0) {
            return Err(Error::Config(format!(
                "time span must be non-negative, got {}",
                time
            )));
        }

        let dt = time / steps as f64;
        let denominator = self.k2.mapv(|k2| 1.0 + 0.5 * dt * self.viscosity * k2);

        if let Some((k, d)) = denominator
            .indexed_iter()
            .find(|&(_, &d)| !(d >= MIN_DENOMINATOR))
        {
            return Err(Error::NumericalInstability(format!(
                "implicit denominator {:e} at mode {} (dt {:e}, viscosity {:e})",
                d, k, dt, self.viscosity
            )));
        }

        Ok(Step {
            dt,
            steps,
            denominator,
        })
    }

    fn check_cfl(&self, step: &Step, max_speed: f64) {
        let cfl = step.dt * max_speed / self.dx();
        if cfl > 1.0 {
            warn!(
                "CFL number {:.3} exceeds 1 (dt {:e}, dx {:e}), the explicit advection may be inaccurate",
                cfl,
                step.dt,
                self.dx()
            );
        }
    }

    /// Advances `u` in place by one substep.
    fn advance(&self, step: &Step, mut u: ArrayViewMut1<f64>) {
        let uh = self.fft.ptospc(u.view());

        let mut duh = uh;
        Zip::from(&mut duh)
            .and(&self.derivative)
            .for_each(|c, &k| *c *= Complex64::new(0.0, k));
        let ux = self.fft.spctop(duh.view());

        Zip::from(&mut u)
            .and(&ux)
            .for_each(|u, &ux| *u += step.dt * (-0.5 * ux * *u));

        let mut rh = self.fft.ptospc(u.view());
        Zip::from(&mut rh)
            .and(&step.denominator)
            .for_each(|c, &d| *c /= d);

        self.fft.spctop_into(rh.view(), u);
    }

    /// Field after `time`, taken in `steps` equal substeps from `u0`.
    pub fn solve(&self, u0: ArrayView1<f64>, time: f64, steps: usize) -> Result<Array1<f64>> {
        if u0.len() != self.len() {
            return Err(Error::shape("initial condition", self.len(), u0.len()));
        }
        ensure_finite("initial condition", &u0)?;

        let step = self.plan(time, steps)?;
        self.check_cfl(&step, max_abs(u0));

        let mut u = u0.to_owned();
        for _ in 0..step.steps {
            self.advance(&step, u.view_mut());
        }

        ensure_finite("Burgers solution", &u)?;
        Ok(u)
    }

    /// Solves every row of `u0` (samples, n) independently.
    pub fn solve_batch(&self, u0: ArrayView2<f64>, time: f64, steps: usize) -> Result<Array2<f64>> {
        if u0.ncols() != self.len() {
            return Err(Error::shape("initial conditions", self.len(), u0.ncols()));
        }
        ensure_finite("initial conditions", &u0)?;

        let step = self.plan(time, steps)?;
        self.check_cfl(&step, u0.iter().fold(0.0, |m, v| m.max(v.abs())));
        debug!(
            "Solving {} Burgers problems on {} points, dt {:e}",
            u0.nrows(),
            self.len(),
            step.dt
        );

        let mut u = u0.to_owned();
        u.axis_iter_mut(Axis(0)).into_par_iter().for_each(|mut u| {
            for _ in 0..step.steps {
                self.advance(&step, u.view_mut());
            }
        });

        ensure_finite("Burgers solutions", &u)?;
        Ok(u)
    }
}

fn max_abs(u: ArrayView1<f64>) -> f64 {
    u.iter().fold(0.0, |m, v| m.max(v.abs()))
}
