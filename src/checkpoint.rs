//! Saved networks: the architecture plus every parameter tensor by name.

use {
    crate::{
        error::Result,
        fno::{Fno1d, Tensors},
        parameters::Model,
    },
    log::debug,
    ndarray::ArrayD,
    rand::{rngs::StdRng, SeedableRng},
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fs::File,
        io::{BufReader, BufWriter},
        path::Path,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: Model,
    pub tensors: BTreeMap<String, ArrayD<f64>>,
}

impl Checkpoint {
    pub fn capture(fno: &Fno1d) -> Self {
        Self {
            model: fno.config.clone(),
            tensors: fno.named_tensors().into_iter().collect(),
        }
    }

    /// Rebuilds the network, failing if any tensor is missing or has the wrong
    /// shape for the stored architecture.
    pub fn restore(&self) -> Result<Fno1d> {
        // every tensor is overwritten, the seed only fixes the placeholder values
        let mut fno = Fno1d::new(&self.model, &mut StdRng::seed_from_u64(0))?;
        fno.assign_named(&self.tensors)?;
        Ok(fno)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(&path)?);
        bincode::serialize_into(writer, self)?;
        debug!(
            "Saved {} tensors to {}",
            self.tensors.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::error::Error,
        ndarray::Array3,
        tempdir::TempDir,
    };

    fn network() -> Fno1d {
        let config = Model {
            width: 3,
            modes: 2,
            convection_modes: 1,
            depth: 2,
            padding: 1,
            ..Model::default()
        };
        Fno1d::new(&config, &mut StdRng::seed_from_u64(17)).unwrap()
    }

    #[test]
    fn file_round_trip() {
        let dir = TempDir::new("checkpoint").unwrap();
        let path = dir.path().join("fno.bin");
        let fno = network();

        Checkpoint::capture(&fno).save(&path).unwrap();
        let restored = Checkpoint::load(&path).unwrap().restore().unwrap();

        assert_eq!(restored, fno);
        let x = Array3::from_shape_fn((1, 8, 1), |(_, i, _)| i as f64);
        assert_eq!(
            restored.forward(x.view()).unwrap(),
            fno.forward(x.view()).unwrap()
        );
    }

    #[test]
    fn missing_tensor() {
        let mut checkpoint = Checkpoint::capture(&network());
        checkpoint.tensors.remove("head.fc2.bias");

        assert!(matches!(checkpoint.restore(), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_tensors() {
        let mut checkpoint = Checkpoint::capture(&network());
        // convection weights without the branch to hold them
        checkpoint.model.convection_modes = 0;

        assert!(matches!(checkpoint.restore(), Err(Error::Config(_))));
    }

    #[test]
    fn rejected_tensors_leave_the_network_unchanged() {
        let source = network();
        let mut tensors = Checkpoint::capture(&source).tensors;
        for t in tensors.values_mut() {
            t.fill(1.0);
        }
        tensors.insert("head.fc3.weight".to_string(), ArrayD::zeros(vec![1]));

        let mut fno = source.clone();
        assert!(fno.assign_named(&tensors).is_err());
        assert_eq!(fno, source);
    }

    #[test]
    fn wrong_shape() {
        let mut checkpoint = Checkpoint::capture(&network());
        checkpoint
            .tensors
            .insert("blocks.1.spectral.re".to_string(), ArrayD::zeros(vec![3, 3, 5]));

        assert!(matches!(
            checkpoint.restore(),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_file() {
        let dir = TempDir::new("checkpoint").unwrap();
        let path = dir.path().join("fno.bin");
        std::fs::write(&path, b"not a checkpoint").unwrap();

        assert!(matches!(Checkpoint::load(&path), Err(Error::Checkpoint(_))));
    }
}
