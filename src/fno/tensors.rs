//! Named parameter tensors.
//!
//! Every learned component hands out its parameters through a visitor, in a
//! fixed order, with dotted names built from the path to the component. The
//! same type doubles as its own gradient container.

use {
    crate::error::{Error, Result},
    ndarray::{ArrayD, ArrayViewD, ArrayViewMutD},
    std::collections::{BTreeMap, BTreeSet},
};

pub trait Tensors {
    fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewD<f64>));

    fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, ArrayViewMutD<f64>));

    fn named_tensors(&self) -> Vec<(String, ArrayD<f64>)> {
        let mut out = vec![];
        self.visit("", &mut |name, t| out.push((name, t.to_owned())));
        out
    }

    fn parameter_count(&self) -> usize {
        let mut count = 0;
        self.visit("", &mut |_, t| count += t.len());
        count
    }

    /// A copy with every parameter set to zero, used to hold gradients.
    fn zeroed(&self) -> Self
    where
        Self: Clone + Sized,
    {
        let mut z = self.clone();
        z.visit_mut("", &mut |_, mut t| t.fill(0.0));
        z
    }

    /// Overwrites every parameter from `tensors`, which must name exactly
    /// the parameters of `self` with matching shapes. Nothing is written
    /// unless every tensor fits.
    fn assign_named(&mut self, tensors: &BTreeMap<String, ArrayD<f64>>) -> Result<()> {
        let mut known = 0;
        let mut result = Ok(());
        self.visit("", &mut |name, t| {
            if result.is_err() {
                return;
            }
            result = match tensors.get(&name) {
                Some(src) if src.shape() == t.shape() => Ok(()),
                Some(src) => Err(Error::shape(&name, t.shape(), src.shape())),
                None => Err(Error::Config(format!("missing tensor \"{}\"", name))),
            };
            known += 1;
        });
        result?;

        if known != tensors.len() {
            let mut names = BTreeSet::new();
            self.visit("", &mut |name, _| {
                names.insert(name);
            });
            let unknown = tensors
                .keys()
                .filter(|name| !names.contains(*name))
                .cloned()
                .collect::<Vec<_>>();
            return Err(Error::Config(format!("unknown tensors {:?}", unknown)));
        }

        self.visit_mut("", &mut |name, mut t| {
            if let Some(src) = tensors.get(&name) {
                t.assign(src);
            }
        });
        Ok(())
    }
}

pub(crate) fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
