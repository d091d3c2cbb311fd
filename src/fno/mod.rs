//! Fourier neural operator for one dimensional fields.
//!
//! The network maps a field a(x) on a uniform periodic grid to a field u(x)
//! on the same grid:
//!
//! 1) append the coordinate x to every point and lift (a(x), x) to `width`
//!    channels with a pointwise linear map,
//! 2) optionally zero-pad the spatial axis (non-periodic problems),
//! 3) apply `depth` Fourier blocks (see `FnoBlock`),
//! 4) crop the padding and project back down to the output channels with a
//!    pointwise MLP.
//!
//! Only the lowest `modes` frequencies are ever multiplied by learned weights,
//! so the same parameters evaluate at any resolution whose Nyquist bound
//! covers `modes`.
//!
//! Gradients are computed explicitly: `forward_trace` records the input of
//! every stage and `backward` replays the stages in reverse.


pub mod block;
pub mod pointwise;
pub mod spectral;
pub mod tensors;

pub use {
    block::FnoBlock,
    pointwise::{gelu, Linear, Mlp},
    spectral::{ConvectionConv1d, ModeWeights, SpectralConv1d},
    tensors::Tensors,
};

use {
    crate::{
        error::{Error, Result},
        grid::with_grid,
        parameters::Model,
    },
    log::debug,
    ndarray::{s, Array3, ArrayView3, ArrayViewD, ArrayViewMutD, Axis},
    rand::Rng,
    tensors::join,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Fno1d {
    pub config: Model,
    pub lift: Linear,
    pub blocks: Vec<FnoBlock>,
    pub head: Mlp,
}

/// Activations recorded by `Fno1d::forward_trace`.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Lift input (batch, in_channels + 1, n)
    lift_input: Array3<f64>,
    /// Input of every block (batch, width, n + padding)
    block_inputs: Vec<Array3<f64>>,
    /// Head input after cropping (batch, width, n)
    head_input: Array3<f64>,
}

impl Fno1d {
    pub fn new<R: Rng + ?Sized>(config: &Model, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let width = config.width;
        let lift = Linear::new(config.in_channels + 1, width, rng);
        let blocks = (0..config.depth)
            .map(|i| {
                FnoBlock::new(
                    width,
                    config.modes,
                    config.convection_modes,
                    i + 1 == config.depth,
                    rng,
                )
            })
            .collect::<Vec<_>>();
        let head = Mlp::new(width, config.out_channels, 2 * width, rng);

        let fno = Self {
            config: config.clone(),
            lift,
            blocks,
            head,
        };
        debug!(
            "Built FNO with {} blocks and {} parameters",
            config.depth,
            fno.parameter_count()
        );

        Ok(fno)
    }

    /// Rejects inputs the network cannot evaluate, before any work is done.
    pub fn check_input(&self, x: &ArrayView3<f64>) -> Result<()> {
        let (batch, n, channels) = x.dim();

        if channels != self.config.in_channels {
            return Err(Error::shape(
                "network input channels",
                self.config.in_channels,
                channels,
            ));
        }
        if batch == 0 || n == 0 {
            return Err(Error::shape(
                "network input",
                "non-empty batch and grid",
                x.shape(),
            ));
        }

        let padded = n + self.config.padding;
        spectral::check_modes(self.config.modes, padded)?;
        spectral::check_modes(self.config.convection_modes, padded)?;

        Ok(())
    }

    /// (batch, n, in_channels) -> (batch, n, out_channels)
    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        self.forward_trace(x).map(|(y, _)| y)
    }

    pub fn forward_trace(&self, x: ArrayView3<f64>) -> Result<(Array3<f64>, Trace)> {
        self.check_input(&x)?;
        let n = x.len_of(Axis(1));

        let lift_input = with_grid(x).permuted_axes([0, 2, 1]).as_standard_layout().to_owned();
        let lifted = self.lift.forward(lift_input.view());

        let mut h = pad(lifted.view(), self.config.padding);
        let mut block_inputs = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let next = block.forward(h.view())?;
            block_inputs.push(h);
            h = next;
        }

        let head_input = h.slice(s![.., .., ..n]).to_owned();
        let y = self
            .head
            .forward(head_input.view())
            .permuted_axes([0, 2, 1])
            .as_standard_layout()
            .to_owned();

        Ok((
            y,
            Trace {
                lift_input,
                block_inputs,
                head_input,
            },
        ))
    }

    /// Parameter gradients given the gradient `dy` (batch, n, out_channels)
    /// of the output recorded in `trace`.
    pub fn backward(&self, trace: &Trace, dy: ArrayView3<f64>) -> Result<Fno1d> {
        let expected = (
            trace.head_input.len_of(Axis(0)),
            trace.head_input.len_of(Axis(2)),
            self.config.out_channels,
        );
        if dy.dim() != expected {
            return Err(Error::shape("output gradient", expected, dy.dim()));
        }

        let dy = dy.permuted_axes([0, 2, 1]);
        let (dhead, head) = self.head.backward(trace.head_input.view(), dy);

        let mut dh = pad(dhead.view(), self.config.padding);
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (block, input) in self.blocks.iter().zip(&trace.block_inputs).rev() {
            let (dx, grad) = block.backward(input.view(), dh.view())?;
            blocks.push(grad);
            dh = dx;
        }
        blocks.reverse();

        let n = trace.lift_input.len_of(Axis(2));
        let (_, lift) = self
            .lift
            .backward(trace.lift_input.view(), dh.slice(s![.., .., ..n]));

        Ok(Fno1d {
            config: self.config.clone(),
            lift,
            blocks,
            head,
        })
    }
}

impl Tensors for Fno1d {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>)) {
        self.lift.visit(&join(prefix, "lift"), f);
        for (i, block) in self.blocks.iter().enumerate() {
            block.visit(&join(prefix, &format!("blocks.{}", i)), f);
        }
        self.head.visit(&join(prefix, "head"), f);
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>)) {
        self.lift.visit_mut(&join(prefix, "lift"), f);
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.visit_mut(&join(prefix, &format!("blocks.{}", i)), f);
        }
        self.head.visit_mut(&join(prefix, "head"), f);
    }
}

/// Appends `padding` zeros to the last axis.
fn pad(x: ArrayView3<f64>, padding: usize) -> Array3<f64> {
    let (batch, channels, n) = x.dim();
    let mut out = Array3::zeros((batch, channels, n + padding));
    out.slice_mut(s![.., .., ..n]).assign(&x);
    out
}
