use {
    crate::error::{Error, Result},
    serde::{Deserialize, Serialize},
};

/// Run parameters
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub data: Data,
    pub model: Model,
    pub training: Training,
    pub environment: Environment,
}

impl Parameters {
    /// Rejects parameter combinations that cannot produce a dataset or a network.
    pub fn validate(&self) -> Result<()> {
        let data = &self.data;
        let training = &self.training;

        if data.grid_resolution < 2 {
            return Err(Error::Config(format!(
                "grid_resolution must be at least 2, got {}",
                data.grid_resolution
            )));
        }
        if data.subsample == 0 || data.subsample > data.grid_resolution {
            return Err(Error::Config(format!(
                "subsample must lie in 1..={}, got {}",
                data.grid_resolution, data.subsample
            )));
        }
        if data.time_steps == 0 {
            return Err(Error::Config("time_steps must be positive".to_string()));
        }
        if !(data.length > 0.0) || !(data.time >= 0.0) {
            return Err(Error::Config(format!(
                "length and time must be positive, got {} and {}",
                data.length, data.time
            )));
        }
        if training.ntrain == 0 || training.batch_size == 0 {
            return Err(Error::Config(
                "ntrain and batch_size must be positive".to_string(),
            ));
        }
        if training.ntrain + training.ntest > data.samples {
            return Err(Error::Config(format!(
                "ntrain + ntest = {} exceeds the {} generated samples",
                training.ntrain + training.ntest,
                data.samples
            )));
        }

        self.model.validate()
    }

    /// Number of grid points seen by the network after subsampling.
    pub fn resolution(&self) -> usize {
        (self.data.grid_resolution + self.data.subsample - 1) / self.data.subsample
    }
}

/// Synthetic Burgers dataset
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Data {
    /// Number of grid points the solver runs at
    pub grid_resolution: usize,
    /// Number of (initial condition, solution) pairs
    pub samples: usize,
    /// Keep every n-th grid point before training
    pub subsample: usize,
    /// Length of the periodic domain
    pub length: f64,
    /// Time span the solver integrates over
    pub time: f64,
    /// Number of solver substeps over the time span
    pub time_steps: usize,
    /// Viscosity
    pub viscosity: f64,
    /// Smoothness exponent of the initial condition field
    pub alpha: f64,
    /// Inverse correlation length of the initial condition field
    pub tau: f64,
    /// Amplitude of the initial condition field
    pub sigma: f64,
    pub seed: u64,
}

impl Default for Data {
    fn default() -> Self {
        Data {
            grid_resolution: 1024,
            samples: 256,
            subsample: 1,
            length: 1.0,
            time: 1.0,
            time_steps: 1000,
            viscosity: 0.1,
            alpha: 2.5,
            tau: 7.0,
            sigma: 49.0,
            seed: 0,
        }
    }
}

/// Shape of the Fourier neural operator
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    /// Field channels in the input (coordinates are appended on top)
    pub in_channels: usize,
    pub out_channels: usize,
    /// Channel width of the lifted representation
    pub width: usize,
    /// Retained low frequency modes per spectral convolution
    pub modes: usize,
    /// Retained high frequency modes of the convection branch, 0 disables it
    pub convection_modes: usize,
    /// Number of Fourier blocks
    pub depth: usize,
    /// Zeros appended to the spatial axis for non-periodic inputs
    pub padding: usize,
}

impl Default for Model {
    fn default() -> Self {
        Model {
            in_channels: 1,
            out_channels: 1,
            width: 64,
            modes: 16,
            convection_modes: 0,
            depth: 4,
            padding: 0,
        }
    }
}

impl Model {
    pub fn validate(&self) -> Result<()> {
        if self.in_channels == 0 || self.out_channels == 0 {
            return Err(Error::Config("channel counts must be positive".to_string()));
        }
        if self.width == 0 || self.modes == 0 || self.depth == 0 {
            return Err(Error::Config(format!(
                "width, modes and depth must be positive, got {}, {} and {}",
                self.width, self.modes, self.depth
            )));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Training {
    pub ntrain: usize,
    pub ntest: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub epochs: usize,
    /// Encode inputs and targets with per-point Gaussian statistics
    pub normalize: bool,
    pub seed: u64,
}

impl Default for Training {
    fn default() -> Self {
        Training {
            ntrain: 200,
            ntest: 20,
            batch_size: 20,
            learning_rate: 1.0e-3,
            weight_decay: 1.0e-4,
            epochs: 500,
            normalize: false,
            seed: 3407,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    /// Directory holding datasets, checkpoints and predictions
    pub output_directory: String,
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            output_directory: "output".to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, std::fs::File};

    #[test]
    fn defaults() {
        assert_eq!(
            Parameters::default(),
            serde_yaml::from_reader::<_, Parameters>(
                File::open("src/testdata/defaults.yaml").unwrap()
            )
            .unwrap()
        );
    }

    #[test]
    fn missing_sections_take_defaults() {
        let params = serde_yaml::from_str::<Parameters>("model:\n  width: 32\n").unwrap();

        assert_eq!(params.model.width, 32);
        assert_eq!(params.model.modes, Model::default().modes);
        assert_eq!(params.data, Data::default());
    }

    #[test]
    fn defaults_are_valid() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn too_many_samples_requested() {
        let mut params = Parameters::default();
        params.training.ntrain = 250;

        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_modes_rejected() {
        let mut params = Parameters::default();
        params.model.modes = 0;

        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn resolution_after_subsampling() {
        let mut params = Parameters::default();
        params.data.grid_resolution = 8192;
        params.data.subsample = 8;

        assert_eq!(params.resolution(), 1024);
    }
}
