//! Training data: synthetic Burgers pairs, `.r8` field files and point-wise
//! normalisation.

use {
    crate::{
        burgers::BurgersSolver,
        error::{Error, Result},
        grf::{Boundary, GaussianRandomField},
        parameters::Data,
    },
    byteorder::{ByteOrder, LittleEndian},
    log::info,
    ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis},
    rand::{seq::SliceRandom, Rng, RngCore},
    std::{
        convert::TryFrom,
        fs::{self, File},
        io::prelude::*,
        path::{Path, PathBuf},
        time::Instant,
    },
};

/// Paired input and output fields, one sample per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub input: Array2<f64>,
    pub output: Array2<f64>,
}

impl Dataset {
    pub fn new(input: Array2<f64>, output: Array2<f64>) -> Result<Self> {
        if input.dim() != output.dim() {
            return Err(Error::shape("dataset output", input.dim(), output.dim()));
        }
        Ok(Self { input, output })
    }

    /// Draws `data.samples` initial conditions from a Gaussian random field and
    /// evolves each of them with the Burgers solver.
    pub fn generate_burgers<R: Rng + ?Sized>(data: &Data, rng: &mut R) -> Result<Self> {
        let start = Instant::now();

        let grf = GaussianRandomField::new(
            data.grid_resolution,
            data.alpha,
            data.tau,
            data.sigma,
            Boundary::Periodic,
        )?;
        let solver = BurgersSolver::new(data.grid_resolution, data.length, data.viscosity)?;

        let input = grf.sample_batch(data.samples, rng)?;
        let output = solver.solve_batch(input.view(), data.time, data.time_steps)?;

        info!(
            "Generated {} Burgers samples on {} points in {:.2}s",
            data.samples,
            data.grid_resolution,
            start.elapsed().as_secs_f64()
        );

        Self::new(input, output)
    }

    pub fn len(&self) -> usize {
        self.input.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of grid points per sample.
    pub fn resolution(&self) -> usize {
        self.input.ncols()
    }

    /// Keeps every `step`th grid point.
    pub fn subsample(&self, step: usize) -> Self {
        let step = step.max(1) as isize;
        Self {
            input: self.input.slice(s![.., ..;step]).to_owned(),
            output: self.output.slice(s![.., ..;step]).to_owned(),
        }
    }

    /// The first `ntrain` samples and the last `ntest` samples.
    pub fn split(&self, ntrain: usize, ntest: usize) -> Result<(Self, Self)> {
        let len = self.len();
        if ntrain + ntest > len {
            return Err(Error::Config(format!(
                "cannot split {} samples into {} training and {} test samples",
                len, ntrain, ntest
            )));
        }

        let rows = |from: usize, to: usize| Self {
            input: self.input.slice(s![from..to, ..]).to_owned(),
            output: self.output.slice(s![from..to, ..]).to_owned(),
        };

        Ok((rows(0, ntrain), rows(len - ntest, len)))
    }

    /// Mini-batches of (input (b, n, 1), output (b, n)). The order is shuffled
    /// when a generator is supplied; the last batch may be short.
    pub fn batches(
        &self,
        size: usize,
        rng: Option<&mut dyn RngCore>,
    ) -> Vec<(Array3<f64>, Array2<f64>)> {
        let mut order = (0..self.len()).collect::<Vec<_>>();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }

        order
            .chunks(size.max(1))
            .map(|idx| {
                let input = self.input.select(Axis(0), idx).insert_axis(Axis(2));
                let output = self.output.select(Axis(0), idx);
                (input, output)
            })
            .collect()
    }
}

/// Directory of `<name>.r8` files, each holding a 2D field as two
/// little-endian u64 dimensions followed by the row-major f64 data.
#[derive(Debug, Clone)]
pub struct FieldStore {
    root: PathBuf,
}

impl FieldStore {
    /// Opens `root`, creating it if necessary.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.r8", name))
    }

    pub fn write_field(&self, name: &str, field: ArrayView2<f64>) -> Result<()> {
        let (rows, cols) = field.dim();
        let mut buf = vec![0u8; 16 + 8 * field.len()];

        LittleEndian::write_u64(&mut buf[0..8], rows as u64);
        LittleEndian::write_u64(&mut buf[8..16], cols as u64);
        for (chunk, x) in buf[16..].chunks_mut(8).zip(field.iter()) {
            LittleEndian::write_f64(chunk, *x);
        }

        let mut f = File::create(self.path(name))?;
        f.write_all(&buf)?;
        Ok(())
    }

    pub fn read_field(&self, name: &str) -> Result<Array2<f64>> {
        let path = self.path(name);
        let bytes = fs::read(&path)?;
        let what = path.display().to_string();

        if bytes.len() < 16 {
            return Err(Error::shape(&what, "at least a 16 byte header", bytes.len()));
        }
        let header = (
            LittleEndian::read_u64(&bytes[0..8]),
            LittleEndian::read_u64(&bytes[8..16]),
        );
        let dims = (usize::try_from(header.0), usize::try_from(header.1));
        let (rows, cols, expected) = match dims {
            (Ok(rows), Ok(cols)) => match rows.checked_mul(cols).and_then(|n| n.checked_mul(8)) {
                Some(expected) => (rows, cols, expected),
                None => return Err(Error::shape(&what, "an addressable field", header)),
            },
            _ => return Err(Error::shape(&what, "an addressable field", header)),
        };

        let data = &bytes[16..];
        if data.len() != expected {
            return Err(Error::shape(&what, expected, data.len()));
        }

        let values = data.chunks(8).map(LittleEndian::read_f64).collect::<Vec<_>>();
        Array2::from_shape_vec((rows, cols), values).map_err(|e| Error::shape(&what, (rows, cols), e))
    }
}

/// Per-point Gaussian normalisation fitted over the sample axis.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitGaussianNormalizer {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
    pub eps: f64,
}

impl UnitGaussianNormalizer {
    pub const EPS: f64 = 1.0E-5;

    /// Fits the mean and (unbiased) standard deviation of every grid point of
    /// `x` (samples, n).
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() < 2 {
            return Err(Error::Config(format!(
                "normaliser needs at least 2 samples, got {}",
                x.nrows()
            )));
        }

        Ok(Self {
            mean: x.mean_axis(Axis(0)).ok_or_else(|| {
                Error::Config("cannot fit a normaliser to an empty grid".to_string())
            })?,
            std: x.std_axis(Axis(0), 1.0),
            eps: Self::EPS,
        })
    }

    pub fn encode(&self, x: ArrayView2<f64>) -> Array2<f64> {
        (&x - &self.mean) / &(&self.std + self.eps)
    }

    pub fn decode(&self, x: ArrayView2<f64>) -> Array2<f64> {
        &x * &(&self.std + self.eps) + &self.mean
    }

    /// Derivative of `decode` with respect to its input, per grid point.
    pub fn scale(&self) -> Array1<f64> {
        &self.std + self.eps
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::utils::assert_approx_eq_slice,
        approx::assert_abs_diff_eq,
        ndarray::array,
        rand::{rngs::StdRng, SeedableRng},
        tempdir::TempDir,
    };

    fn toy() -> Dataset {
        let input = Array2::from_shape_fn((5, 6), |(i, j)| (10 * i + j) as f64);
        Dataset::new(input.clone(), -input).unwrap()
    }

    #[test]
    fn mismatched_shapes() {
        assert!(matches!(
            Dataset::new(Array2::zeros((2, 4)), Array2::zeros((2, 5))),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn subsample_keeps_every_nth_point() {
        let sub = toy().subsample(2);

        assert_eq!(sub.input.dim(), (5, 3));
        assert_eq!(sub.input.row(1), array![10.0, 12.0, 14.0]);
        assert_eq!(sub.output.row(1), array![-10.0, -12.0, -14.0]);
        assert_eq!(toy().subsample(4).resolution(), 2);
    }

    #[test]
    fn split_takes_first_and_last_samples() {
        let (train, test) = toy().split(2, 2).unwrap();

        assert_eq!(train.len(), 2);
        assert_eq!(test.len(), 2);
        assert_eq!(train.input[[1, 0]], 10.0);
        assert_eq!(test.input[[0, 0]], 30.0);
        assert_eq!(test.input[[1, 0]], 40.0);

        assert!(matches!(toy().split(4, 2), Err(Error::Config(_))));
    }

    #[test]
    fn batches_cover_every_sample_once() {
        let data = toy();
        let mut rng = StdRng::seed_from_u64(1);

        let batches = data.batches(2, Some(&mut rng));

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0.dim(), (2, 6, 1));
        assert_eq!(batches[2].1.dim(), (1, 6));

        let mut firsts = batches
            .iter()
            .flat_map(|(x, y)| {
                for (xr, yr) in x.outer_iter().zip(y.outer_iter()) {
                    assert_eq!(xr[[0, 0]], -yr[0]);
                }
                x.slice(s![.., 0, 0]).to_vec()
            })
            .collect::<Vec<_>>();
        firsts.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(firsts, vec![0.0, 10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn unshuffled_batches_keep_order() {
        let batches = toy().batches(3, None);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0[[2, 0, 0]], 20.0);
        assert_eq!(batches[1].0[[0, 0, 0]], 30.0);
    }

    #[test]
    fn generated_burgers_pairs() {
        let data = Data {
            grid_resolution: 64,
            samples: 3,
            time: 0.1,
            time_steps: 50,
            ..Data::default()
        };
        let mut rng = StdRng::seed_from_u64(data.seed);

        let set = Dataset::generate_burgers(&data, &mut rng).unwrap();

        assert_eq!(set.input.dim(), (3, 64));
        assert_eq!(set.output.dim(), (3, 64));
        assert!(set.output.iter().all(|v| v.is_finite()));
        assert_ne!(set.input, set.output);
        for (a, u) in set.input.outer_iter().zip(set.output.outer_iter()) {
            assert_abs_diff_eq!(a.sum(), u.sum(), epsilon = 1.0E-8 * a.mapv(f64::abs).sum());
        }
    }

    #[test]
    fn field_store_round_trip() {
        let dir = TempDir::new("fields").unwrap();
        let store = FieldStore::new(dir.path().join("nested")).unwrap();
        let field = Array2::from_shape_fn((3, 4), |(i, j)| i as f64 - 0.25 * j as f64);

        store.write_field("input", field.view()).unwrap();

        assert_eq!(
            fs::metadata(store.path("input")).unwrap().len(),
            16 + 8 * 12
        );
        assert_eq!(store.read_field("input").unwrap(), field);
        // transposed views are written in logical order
        store.write_field("transposed", field.t()).unwrap();
        assert_eq!(store.read_field("transposed").unwrap(), field.t());
    }

    #[test]
    fn field_store_rejects_truncated_files() {
        let dir = TempDir::new("fields").unwrap();
        let store = FieldStore::new(dir.path()).unwrap();
        store
            .write_field("x", Array2::<f64>::zeros((2, 2)).view())
            .unwrap();

        let bytes = fs::read(store.path("x")).unwrap();
        fs::write(store.path("x"), &bytes[..bytes.len() - 8]).unwrap();

        assert!(matches!(
            store.read_field("x"),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(store.read_field("missing"), Err(Error::Io(_))));
    }

    #[test]
    fn field_store_rejects_oversized_headers() {
        let dir = TempDir::new("fields").unwrap();
        let store = FieldStore::new(dir.path()).unwrap();

        for &(rows, cols) in &[(1u64 << 62, 4u64), (u64::MAX, u64::MAX), (1 << 40, 1 << 40)] {
            let mut bytes = vec![0u8; 16 + 8];
            LittleEndian::write_u64(&mut bytes[0..8], rows);
            LittleEndian::write_u64(&mut bytes[8..16], cols);
            fs::write(store.path("x"), &bytes).unwrap();

            assert!(matches!(
                store.read_field("x"),
                Err(Error::ShapeMismatch { .. })
            ));
        }
    }

    #[test]
    fn normaliser_statistics() {
        let x = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];

        let norm = UnitGaussianNormalizer::fit(x.view()).unwrap();

        assert_approx_eq_slice(norm.mean.as_slice().unwrap(), &[3.0, 10.0], 1.0E-15);
        assert_approx_eq_slice(norm.std.as_slice().unwrap(), &[2.0, 0.0], 1.0E-15);

        let encoded = norm.encode(x.view());
        assert_abs_diff_eq!(encoded[[0, 0]], -2.0 / (2.0 + 1.0E-5), epsilon = 1.0E-15);
        assert_abs_diff_eq!(encoded[[1, 1]], 0.0);
    }

    #[test]
    fn normaliser_decode_inverts_encode() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = Array2::from_shape_fn((8, 16), |_| rng.gen_range(-5.0..5.0));
        let norm = UnitGaussianNormalizer::fit(x.view()).unwrap();

        let round = norm.decode(norm.encode(x.view()).view());

        assert_abs_diff_eq!(round, x, epsilon = 1.0E-12);
        assert!(matches!(
            UnitGaussianNormalizer::fit(x.slice(s![..1, ..])),
            Err(Error::Config(_))
        ));
    }
}
