//! Mini-batch training and evaluation of `Fno1d` on paired fields.

use {
    crate::{
        data::{Dataset, UnitGaussianNormalizer},
        error::{Error, Result},
        fno::Fno1d,
        loss::{mse, LpLoss},
        optim::{Adam, CosineAnnealing},
        parameters::Training,
    },
    log::info,
    ndarray::{s, Array2, Array3, ArrayView2, Axis},
    rand::Rng,
    serde::{Deserialize, Serialize},
    std::{fmt, time::Instant},
};

/// Diagnostics of one training epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub seconds: f64,
    /// Mean over batches of the mean squared error
    pub train_mse: f64,
    /// Relative L2 loss per training sample
    pub train_l2: f64,
    /// Relative L2 loss per test sample
    pub test_l2: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.3} {:.8E} {:.8E} {:.8E}",
            self.epoch, self.seconds, self.train_mse, self.train_l2, self.test_l2
        )
    }
}

/// Input and output normalisers fitted on the training set. The network sees
/// encoded inputs and predicts encoded outputs; losses are always computed on
/// decoded outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    pub input: UnitGaussianNormalizer,
    pub output: UnitGaussianNormalizer,
}

impl Normalization {
    pub fn fit(train: &Dataset) -> Result<Self> {
        Ok(Self {
            input: UnitGaussianNormalizer::fit(train.input.view())?,
            output: UnitGaussianNormalizer::fit(train.output.view())?,
        })
    }

    pub fn fit_if(enabled: bool, train: &Dataset) -> Result<Option<Self>> {
        if enabled {
            Self::fit(train).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Network input (b, n, 1) for the fields `x` (b, n).
fn network_input(x: ArrayView2<f64>, norm: Option<&Normalization>) -> Array3<f64> {
    let x = match norm {
        Some(norm) => norm.input.encode(x),
        None => x.to_owned(),
    };
    x.insert_axis(Axis(2))
}

/// Physical prediction (b, n) from the network output (b, n, 1).
fn decode_output(out: &Array3<f64>, norm: Option<&Normalization>) -> Array2<f64> {
    let out = out.index_axis(Axis(2), 0);
    match norm {
        Some(norm) => norm.output.decode(out),
        None => out.to_owned(),
    }
}

/// Trains `model` for `config.epochs` epochs of shuffled mini-batches with Adam
/// and a per-iteration cosine schedule, evaluating on `test` after every
/// epoch.
pub fn train<R: Rng>(
    model: &mut Fno1d,
    train: &Dataset,
    test: &Dataset,
    config: &Training,
    rng: &mut R,
) -> Result<Vec<EpochReport>> {
    if train.is_empty() || config.batch_size == 0 {
        return Err(Error::Config(
            "training needs samples and a positive batch size".to_string(),
        ));
    }

    let norm = Normalization::fit_if(config.normalize, train)?;
    let loss = LpLoss::default();

    let batches_per_epoch = (train.len() + config.batch_size - 1) / config.batch_size;
    let mut adam = Adam::new(config.learning_rate, config.weight_decay);
    let mut schedule = CosineAnnealing::new(config.learning_rate, config.epochs * batches_per_epoch);

    info!(
        "Training on {} samples ({} batches per epoch), testing on {}",
        train.len(),
        batches_per_epoch,
        test.len()
    );

    let mut reports = Vec::with_capacity(config.epochs);
    for epoch in 0..config.epochs {
        let start = Instant::now();
        let mut train_mse = 0.0;
        let mut train_l2 = 0.0;

        for (x, y) in train.batches(config.batch_size, Some(&mut *rng)) {
            let input = network_input(x.index_axis(Axis(2), 0), norm.as_ref());
            let (out, trace) = model.forward_trace(input.view())?;
            let pred = decode_output(&out, norm.as_ref());

            train_mse += mse(pred.view(), y.view())?;
            let (l2, mut dpred) = loss.rel_backward(pred.view(), y.view())?;
            if !l2.is_finite() {
                return Err(Error::NonFinite(format!("training loss at epoch {}", epoch)));
            }
            train_l2 += l2;

            if let Some(norm) = &norm {
                dpred *= &norm.output.scale();
            }
            let grads = model.backward(&trace, dpred.insert_axis(Axis(2)).view())?;

            adam.step(model, &grads)?;
            schedule.step(&mut adam);
        }

        let (test_l2, _) = evaluate(model, test, norm.as_ref(), config.batch_size)?;

        let report = EpochReport {
            epoch,
            seconds: start.elapsed().as_secs_f64(),
            train_mse: train_mse / batches_per_epoch as f64,
            train_l2: train_l2 / train.len() as f64,
            test_l2,
        };
        info!("{}", report);
        reports.push(report);
    }

    Ok(reports)
}

/// Mean relative L2 loss of `model` on `data` and the decoded predictions
/// (samples, n).
pub fn evaluate(
    model: &Fno1d,
    data: &Dataset,
    norm: Option<&Normalization>,
    batch_size: usize,
) -> Result<(f64, Array2<f64>)> {
    let loss = LpLoss::default();
    let mut total = 0.0;
    let mut prediction = Array2::zeros(data.output.raw_dim());

    let mut row = 0;
    for (x, y) in data.batches(batch_size, None) {
        let input = network_input(x.index_axis(Axis(2), 0), norm);
        let pred = decode_output(&model.forward(input.view())?, norm);

        total += loss.rel(pred.view(), y.view())?;
        prediction
            .slice_mut(s![row..row + pred.nrows(), ..])
            .assign(&pred);
        row += pred.nrows();
    }

    let mean = if data.is_empty() {
        0.0
    } else {
        total / data.len() as f64
    };
    Ok((mean, prediction))
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::parameters::Model,
        rand::{rngs::StdRng, SeedableRng},
    };

    fn tiny() -> (Fno1d, Dataset) {
        let mut rng = StdRng::seed_from_u64(0);
        let model = Fno1d::new(
            &Model {
                width: 4,
                modes: 3,
                depth: 2,
                ..Model::default()
            },
            &mut rng,
        )
        .unwrap();
        let input = Array2::from_shape_fn((6, 16), |(b, i)| {
            ((b + 1) as f64 * i as f64 * 0.4).sin()
        });
        let output = input.mapv(|v| 0.5 * v + 0.1);
        (model, Dataset::new(input, output).unwrap())
    }

    #[test]
    fn report_line() {
        let report = EpochReport {
            epoch: 3,
            seconds: 1.25,
            train_mse: 0.5,
            train_l2: 0.25,
            test_l2: 0.125,
        };

        insta::assert_snapshot!(report.to_string(), @"3 1.250 5.00000000E-1 2.50000000E-1 1.25000000E-1");
    }

    #[test]
    fn evaluate_keeps_sample_order() {
        let (model, data) = tiny();

        let (loss, prediction) = evaluate(&model, &data, None, 4).unwrap();
        let single = model
            .forward(data.input.slice(s![5..6, ..]).insert_axis(Axis(2)))
            .unwrap();

        let expected = single.index_axis(Axis(0), 0);

        assert!(loss.is_finite() && loss > 0.0);
        assert_eq!(prediction.dim(), (6, 16));
        approx::assert_abs_diff_eq!(
            prediction.row(5),
            expected.column(0),
            epsilon = 1.0E-12
        );
    }

    #[test]
    fn one_report_per_epoch() {
        let (mut model, data) = tiny();
        let config = Training {
            batch_size: 4,
            epochs: 3,
            learning_rate: 1.0E-2,
            normalize: true,
            ..Training::default()
        };
        let mut rng = StdRng::seed_from_u64(1);

        let reports = train(&mut model, &data, &data, &config, &mut rng).unwrap();

        assert_eq!(
            reports.iter().map(|r| r.epoch).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(reports
            .iter()
            .all(|r| r.train_mse.is_finite() && r.test_l2.is_finite()));
    }

    #[test]
    fn empty_training_set() {
        let (mut model, data) = tiny();
        let (empty, _) = data.split(0, 1).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert!(matches!(
            train(&mut model, &empty, &data, &Training::default(), &mut rng),
            Err(Error::Config(_))
        ));
    }
}
