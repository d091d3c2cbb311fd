#[macro_use]
extern crate clap;

use {
    anyhow::{bail, Result},
    fourier_operator::{
        checkpoint::Checkpoint,
        data::{Dataset, FieldStore},
        fno::{Fno1d, Tensors},
        parameters::Parameters,
        train::{evaluate, train, Normalization},
    },
    log::{error, info},
    rand::{rngs::StdRng, SeedableRng},
    simplelog::{Config as LogConfig, LevelFilter, TermLogger, TerminalMode},
    std::{
        fs::{create_dir_all, File},
        io::prelude::*,
        path::Path,
    },
};

#[quit::main]
fn main() {
    let matches = clap_app!(fourier_operator =>
        (version: crate_version!())
        (@arg PARAMETERS: -p --parameters +takes_value +required "Path to file containing run parameters.")
        (@subcommand generate =>
            (about: "Samples Gaussian random initial conditions and evolves them with the Burgers solver, writing input.r8 and output.r8.")
        )
        (@subcommand train =>
            (about: "Trains a Fourier neural operator on input.r8/output.r8, writing fno.bin and losses.asc.")
        )
        (@subcommand predict =>
            (about: "Evaluates fno.bin on the test split, writing prediction.r8.")
        )
    )
    .get_matches();

    TermLogger::init(
        LevelFilter::Debug,
        LogConfig::default(),
        TerminalMode::Mixed,
    )
    .expect("Failed to initialize logger");

    let params = {
        // Should never panic as clap should return an error if the argument was not supplied
        let path = matches
            .value_of("PARAMETERS")
            .expect("Path to parameters file not supplied");

        let file = File::open(path).unwrap_or_else(|e| {
            error!("Failed to open {}: \"{}\"", path, e);
            quit::with_code(1);
        });

        let params = serde_yaml::from_reader::<_, Parameters>(file).unwrap_or_else(|e| {
            error!("Failed to parse parameters from {}: \"{}\"", path, e);
            quit::with_code(1);
        });

        info!(
            "Successfully loaded run parameters from \"{}\": \n{:#?}",
            path, params
        );

        params
    };

    run_subcommand(matches.subcommand_name(), params).unwrap_or_else(|e| {
        error!("Error: \"{}\"", e);
        quit::with_code(1);
    });
}

fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(data)?;
    Ok(())
}

/// Reads the generated pairs and returns the subsampled train and test splits.
fn load_splits(store: &FieldStore, params: &Parameters) -> Result<(Dataset, Dataset)> {
    let data = Dataset::new(store.read_field("input")?, store.read_field("output")?)?
        .subsample(params.data.subsample);
    info!(
        "Loaded {} samples at resolution {}",
        data.len(),
        data.resolution()
    );

    Ok(data.split(params.training.ntrain, params.training.ntest)?)
}

fn run_subcommand(subcmd: Option<&str>, params: Parameters) -> Result<()> {
    let subcmd = match subcmd {
        Some(s) => s,
        None => bail!("No subcommand selected"),
    };

    params.validate()?;

    let output_directory = Path::new(&params.environment.output_directory);
    create_dir_all(output_directory)?;
    let store = FieldStore::new(output_directory)?;
    let checkpoint_path = output_directory.join("fno.bin");

    info!("Starting {}", subcmd);

    match subcmd {
        "generate" => {
            let mut rng = StdRng::seed_from_u64(params.data.seed);
            let data = Dataset::generate_burgers(&params.data, &mut rng)?;

            store.write_field("input", data.input.view())?;
            store.write_field("output", data.output.view())?;
        }
        "train" => {
            let (train_set, test_set) = load_splits(&store, &params)?;

            let mut rng = StdRng::seed_from_u64(params.training.seed);
            let mut fno = Fno1d::new(&params.model, &mut rng)?;
            info!("Network has {} parameters", fno.parameter_count());

            let reports = train(&mut fno, &train_set, &test_set, &params.training, &mut rng)?;

            Checkpoint::capture(&fno).save(&checkpoint_path)?;

            let losses = reports
                .iter()
                .map(|r| format!("{}\n", r))
                .collect::<String>();
            write_file(output_directory.join("losses.asc"), losses.as_bytes())?;
        }
        "predict" => {
            let (train_set, test_set) = load_splits(&store, &params)?;

            let fno = Checkpoint::load(&checkpoint_path)?.restore()?;
            let norm = Normalization::fit_if(params.training.normalize, &train_set)?;

            let (loss, prediction) = evaluate(
                &fno,
                &test_set,
                norm.as_ref(),
                params.training.batch_size,
            )?;
            info!(
                "Relative L2 test loss over {} samples: {:.6}",
                test_set.len(),
                loss
            );

            store.write_field("prediction", prediction.view())?;
        }
        _ => {
            // Should be unreachable due to clap catching this error
            bail!("Unrecognized subcommand");
        }
    }

    info!("Finished {}", subcmd);

    Ok(())
}
