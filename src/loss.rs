//! Losses comparing predicted fields (batch, n) with reference fields.

use {
    crate::error::{Error, Result},
    ndarray::{Array2, ArrayView1, ArrayView2, Zip},
};

/// Relative Lp loss sum_b ||pred_b - true_b||_p / ||true_b||_p, averaged over
/// the batch when `size_average` is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LpLoss {
    pub p: f64,
    pub size_average: bool,
}

impl Default for LpLoss {
    fn default() -> Self {
        Self {
            p: 2.0,
            size_average: false,
        }
    }
}

impl LpLoss {
    fn norm(&self, x: ArrayView1<f64>) -> f64 {
        x.iter()
            .map(|v| v.abs().powf(self.p))
            .sum::<f64>()
            .powf(1.0 / self.p)
    }

    fn check(pred: &ArrayView2<f64>, truth: &ArrayView2<f64>) -> Result<()> {
        if pred.dim() != truth.dim() {
            return Err(Error::shape("loss prediction", truth.dim(), pred.dim()));
        }
        Ok(())
    }

    fn reduction(&self, batch: usize) -> f64 {
        if self.size_average {
            1.0 / batch.max(1) as f64
        } else {
            1.0
        }
    }

    pub fn rel(&self, pred: ArrayView2<f64>, truth: ArrayView2<f64>) -> Result<f64> {
        Self::check(&pred, &truth)?;

        let total = pred
            .outer_iter()
            .zip(truth.outer_iter())
            .map(|(p, t)| self.norm((&p - &t).view()) / self.norm(t))
            .sum::<f64>();

        Ok(total * self.reduction(pred.nrows()))
    }

    /// Loss and its gradient with respect to `pred`.
    pub fn rel_backward(
        &self,
        pred: ArrayView2<f64>,
        truth: ArrayView2<f64>,
    ) -> Result<(f64, Array2<f64>)> {
        Self::check(&pred, &truth)?;

        let scale = self.reduction(pred.nrows());
        let mut grad = Array2::zeros(pred.raw_dim());
        let mut total = 0.0;

        for ((p, t), mut g) in pred
            .outer_iter()
            .zip(truth.outer_iter())
            .zip(grad.outer_iter_mut())
        {
            let diff = &p - &t;
            let dnorm = self.norm(diff.view());
            let tnorm = self.norm(t);
            total += dnorm / tnorm;

            if dnorm > 0.0 {
                // d||d||_p / dd_i = sign(d_i) |d_i|^(p-1) / ||d||_p^(p-1)
                let denom = dnorm.powf(self.p - 1.0) * tnorm;
                Zip::from(&mut g).and(&diff).for_each(|g, &d| {
                    *g = scale * d.signum() * d.abs().powf(self.p - 1.0) / denom;
                });
            }
        }

        Ok((total * scale, grad))
    }
}

/// Mean squared error over every element.
pub fn mse(pred: ArrayView2<f64>, truth: ArrayView2<f64>) -> Result<f64> {
    LpLoss::check(&pred, &truth)?;
    if pred.is_empty() {
        return Ok(0.0);
    }

    let mut sum = 0.0;
    Zip::from(&pred)
        .and(&truth)
        .for_each(|&p, &t| sum += (p - t) * (p - t));
    Ok(sum / pred.len() as f64)
}

#[cfg(test)]
mod test {
    use {super::*, approx::assert_abs_diff_eq, ndarray::array};

    #[test]
    fn relative_l2() {
        let loss = LpLoss::default();
        let truth = array![[3.0, 4.0], [1.0, 0.0]];
        let pred = array![[3.0, 4.0], [2.0, 0.0]];

        // 0 / 5 + 1 / 1
        assert_abs_diff_eq!(loss.rel(pred.view(), truth.view()).unwrap(), 1.0);

        let mean = LpLoss {
            size_average: true,
            ..LpLoss::default()
        };
        assert_abs_diff_eq!(mean.rel(pred.view(), truth.view()).unwrap(), 0.5);
    }

    #[test]
    fn relative_loss_is_scale_invariant() {
        let loss = LpLoss::default();
        let truth = array![[1.0, -2.0, 0.5]];
        let pred = array![[1.5, -1.0, 0.0]];

        let a = loss.rel(pred.view(), truth.view()).unwrap();
        let b = loss
            .rel((&pred * 1.0E3).view(), (&truth * 1.0E3).view())
            .unwrap();

        assert_abs_diff_eq!(a, b, epsilon = 1.0E-14);
    }

    #[test]
    fn gradient_matches_central_difference() {
        let truth = array![[1.0, -2.0, 0.5, 0.0], [0.3, 0.2, -0.1, 2.0]];
        let pred = array![[1.2, -1.5, 0.1, 0.4], [0.0, 0.5, -0.3, 1.0]];

        for &(p, size_average) in &[(2.0, false), (2.0, true), (3.0, false)] {
            let loss = LpLoss { p, size_average };
            let (value, grad) = loss.rel_backward(pred.view(), truth.view()).unwrap();
            assert_abs_diff_eq!(value, loss.rel(pred.view(), truth.view()).unwrap());

            let h = 1.0E-6;
            for ((b, i), g) in grad.indexed_iter() {
                let mut plus = pred.clone();
                let mut minus = pred.clone();
                plus[[b, i]] += h;
                minus[[b, i]] -= h;
                let fd = (loss.rel(plus.view(), truth.view()).unwrap()
                    - loss.rel(minus.view(), truth.view()).unwrap())
                    / (2.0 * h);
                assert_abs_diff_eq!(*g, fd, epsilon = 1.0E-7);
            }
        }
    }

    #[test]
    fn exact_prediction_has_zero_gradient() {
        let truth = array![[1.0, 2.0]];
        let (value, grad) = LpLoss::default()
            .rel_backward(truth.view(), truth.view())
            .unwrap();

        assert_eq!(value, 0.0);
        assert_eq!(grad, array![[0.0, 0.0]]);
    }

    #[test]
    fn mean_squared_error() {
        let truth = array![[0.0, 1.0], [2.0, 3.0]];
        let pred = array![[1.0, 1.0], [2.0, 1.0]];

        assert_abs_diff_eq!(mse(pred.view(), truth.view()).unwrap(), 5.0 / 4.0);
        assert!(matches!(
            mse(pred.view(), array![[1.0]].view()),
            Err(Error::ShapeMismatch { .. })
        ));
    }
}
