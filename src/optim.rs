//! Adam with L2 weight decay and a cosine annealing learning rate schedule.

use {
    crate::{
        error::{Error, Result},
        fno::Tensors,
    },
    ndarray::{ArrayD, Zip},
    std::f64::consts::PI,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    pub lr: f64,
    pub betas: (f64, f64),
    pub eps: f64,
    pub weight_decay: f64,
    t: usize,
    m: Vec<ArrayD<f64>>,
    v: Vec<ArrayD<f64>>,
}

impl Adam {
    pub fn new(lr: f64, weight_decay: f64) -> Self {
        Self {
            lr,
            betas: (0.9, 0.999),
            eps: 1.0E-8,
            weight_decay,
            t: 0,
            m: vec![],
            v: vec![],
        }
    }

    /// Number of updates applied so far.
    pub fn steps(&self) -> usize {
        self.t
    }

    /// Updates every tensor of `params` from the tensor of the same name in
    /// `grads`. Both must come from the same architecture; on a mismatch
    /// neither the parameters nor the optimiser state change.
    pub fn step<T: Tensors>(&mut self, params: &mut T, grads: &T) -> Result<()> {
        let grads = grads.named_tensors();
        self.check(params, &grads)?;

        if self.m.is_empty() {
            self.m = grads.iter().map(|(_, g)| ArrayD::zeros(g.raw_dim())).collect();
            self.v = self.m.clone();
        }

        self.t += 1;
        let (beta1, beta2) = self.betas;
        let bc1 = 1.0 - beta1.powi(self.t as i32);
        let bc2 = 1.0 - beta2.powi(self.t as i32);
        let (lr, eps, weight_decay) = (self.lr, self.eps, self.weight_decay);

        let m = &mut self.m;
        let v = &mut self.v;
        let mut i = 0;

        params.visit_mut("", &mut |_, mut p| {
            Zip::from(&mut p)
                .and(&grads[i].1)
                .and(&mut m[i])
                .and(&mut v[i])
                .for_each(|p, &g, m, v| {
                    let g = g + weight_decay * *p;
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr * (*m / bc1) / ((*v / bc2).sqrt() + eps);
                });
            i += 1;
        });

        Ok(())
    }

    /// Every parameter must have a gradient of the same name and shape, in
    /// visit order, and match the moment estimates once they exist.
    fn check<T: Tensors>(&self, params: &T, grads: &[(String, ArrayD<f64>)]) -> Result<()> {
        let mut i = 0;
        let mut result = Ok(());

        params.visit("", &mut |name, p| {
            if result.is_err() {
                return;
            }
            result = match grads.get(i) {
                Some((gname, g)) if *gname == name && g.shape() == p.shape() => {
                    match self.m.get(i) {
                        Some(m) if m.shape() != p.shape() => {
                            Err(Error::shape("optimiser state", p.shape(), m.shape()))
                        }
                        _ => Ok(()),
                    }
                }
                Some((gname, g)) => Err(Error::shape(
                    &format!("gradient of {}", name),
                    (name.clone(), p.shape().to_vec()),
                    (gname.clone(), g.shape().to_vec()),
                )),
                None => Err(Error::Config(format!("no gradient for \"{}\"", name))),
            };
            i += 1;
        });
        result?;

        if grads.len() != i {
            return Err(Error::shape("gradients", i, grads.len()));
        }
        if !self.m.is_empty() && self.m.len() != i {
            return Err(Error::shape("optimiser state", i, self.m.len()));
        }
        Ok(())
    }
}

/// Cosine annealing from `base_lr` down to `eta_min` over `t_max` steps.
#[derive(Debug, Clone, PartialEq)]
pub struct CosineAnnealing {
    pub base_lr: f64,
    pub t_max: usize,
    pub eta_min: f64,
    t: usize,
}

impl CosineAnnealing {
    pub fn new(base_lr: f64, t_max: usize) -> Self {
        Self {
            base_lr,
            t_max: t_max.max(1),
            eta_min: 0.0,
            t: 0,
        }
    }

    pub fn lr_at(&self, t: usize) -> f64 {
        let phase = PI * t as f64 / self.t_max as f64;
        self.eta_min + 0.5 * (self.base_lr - self.eta_min) * (1.0 + phase.cos())
    }

    /// Advances the schedule and writes the new rate into `opt`.
    pub fn step(&mut self, opt: &mut Adam) {
        self.t += 1;
        opt.lr = self.lr_at(self.t);
    }
}
