use {
    super::{
        pointwise::{gelu, gelu_backward, Linear, Mlp},
        spectral::{ConvectionConv1d, SpectralConv1d},
        tensors::{join, Tensors},
    },
    crate::error::Result,
    ndarray::{Array3, ArrayView3, ArrayViewD, ArrayViewMutD},
    rand::Rng,
};

/// One Fourier block on (batch, width, n):
///
/// out = act(mlp(spectral(x)) + bypass(x))
///
/// With a convection branch c = convection(x) the bypass reads x + c and c is
/// added once more before the activation. The last block of a stack skips the
/// activation (and the second c) so its output feeds the projection head
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct FnoBlock {
    pub spectral: SpectralConv1d,
    pub mlp: Mlp,
    pub bypass: Linear,
    pub convection: Option<ConvectionConv1d>,
    pub last: bool,
}

struct Pieces {
    spectral: Array3<f64>,
    convection: Option<Array3<f64>>,
    bypass_input: Array3<f64>,
    pre: Array3<f64>,
}

impl FnoBlock {
    pub fn new<R: Rng + ?Sized>(
        width: usize,
        modes: usize,
        convection_modes: usize,
        last: bool,
        rng: &mut R,
    ) -> Self {
        let spectral = SpectralConv1d::new(width, width, modes, rng);
        let mlp = Mlp::new(width, width, width, rng);
        let bypass = Linear::new(width, width, rng);
        let convection = if convection_modes > 0 {
            Some(ConvectionConv1d::new(width, width, convection_modes, rng))
        } else {
            None
        };

        Self {
            spectral,
            mlp,
            bypass,
            convection,
            last,
        }
    }

    fn pieces(&self, x: ArrayView3<f64>) -> Result<Pieces> {
        let spectral = self.spectral.forward(x)?;
        let convection = match &self.convection {
            Some(conv) => Some(conv.forward(x)?),
            None => None,
        };

        let bypass_input = match &convection {
            Some(c) => &x + c,
            None => x.to_owned(),
        };

        let mut pre = self.mlp.forward(spectral.view()) + self.bypass.forward(bypass_input.view());
        if let (Some(c), false) = (&convection, self.last) {
            pre += c;
        }

        Ok(Pieces {
            spectral,
            convection,
            bypass_input,
            pre,
        })
    }

    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        let pre = self.pieces(x)?.pre;
        if self.last {
            Ok(pre)
        } else {
            Ok(pre.mapv_into(gelu))
        }
    }

    /// Recomputes the block from its input `x` and returns the gradient with
    /// respect to `x` together with the parameter gradients.
    pub fn backward(&self, x: ArrayView3<f64>, dy: ArrayView3<f64>) -> Result<(Array3<f64>, FnoBlock)> {
        let pieces = self.pieces(x)?;

        let dpre = if self.last {
            dy.to_owned()
        } else {
            gelu_backward(pieces.pre.view(), dy)
        };

        let (dspectral, mlp) = self.mlp.backward(pieces.spectral.view(), dpre.view());
        let (mut dx, spectral) = self.spectral.backward(x, dspectral.view())?;
        let (dbypass, bypass) = self.bypass.backward(pieces.bypass_input.view(), dpre.view());
        dx += &dbypass;

        let convection = match (&self.convection, &pieces.convection) {
            (Some(conv), Some(_)) => {
                let mut dc = dbypass;
                if !self.last {
                    dc += &dpre;
                }
                let (dxc, grad) = conv.backward(x, dc.view())?;
                dx += &dxc;
                Some(grad)
            }
            _ => None,
        };

        Ok((
            dx,
            FnoBlock {
                spectral,
                mlp,
                bypass,
                convection,
                last: self.last,
            },
        ))
    }
}

impl Tensors for FnoBlock {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>)) {
        self.spectral.visit(&join(prefix, "spectral"), f);
        self.mlp.visit(&join(prefix, "mlp"), f);
        self.bypass.visit(&join(prefix, "bypass"), f);
        if let Some(conv) = &self.convection {
            conv.visit(&join(prefix, "convection"), f);
        }
    }

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>)) {
        self.spectral.visit_mut(&join(prefix, "spectral"), f);
        self.mlp.visit_mut(&join(prefix, "mlp"), f);
        self.bypass.visit_mut(&join(prefix, "bypass"), f);
        if let Some(conv) = &mut self.convection {
            conv.visit_mut(&join(prefix, "convection"), f);
        }
    }
}
