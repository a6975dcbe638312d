use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tinydnn::utils::dataset::RawData;
use tinydnn::utils::measure::ErrorMeasure;
use tinydnn::{Backend, Config, DataSet, LogReporter, Normalization, TrainingSession, DNN};

#[derive(Parser)]
#[command(
    name = "dnn-train",
    about = "Train a feed-forward sigmoid network",
    after_help = "Example usage: dnn-train data/train3.dat --nodes=16-8"
)]
struct Args {
    training_set_file: String,

    /// Hidden layer widths, e.g. 16-8
    #[arg(long, default_value = "")]
    nodes: String,

    /// Input dimension (0 for auto detection)
    #[arg(long, default_value_t = 0)]
    input_dim: usize,

    /// 0: none, 1: rescale to [0, 1], 2: standard score
    #[arg(long, default_value_t = 0)]
    normalize: u8,

    /// Label id starts from 0 or 1
    #[arg(long, default_value_t = 0)]
    base: usize,

    /// Ratio of training set to validation set
    #[arg(short = 'v', default_value_t = 5)]
    ratio: usize,

    #[arg(long, default_value_t = 100_000)]
    max_epoch: usize,

    /// Minimum validation accuracy
    #[arg(long, default_value_t = 0.5)]
    min_acc: f32,

    #[arg(long, default_value_t = 0.01)]
    learning_rate: f32,

    /// Variance of the normal distribution for initial weights
    #[arg(long, default_value_t = 0.01)]
    variance: f32,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Run matrix kernels on the rayon pool
    #[arg(long)]
    parallel: bool,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn parse_nodes(nodes: &str) -> anyhow::Result<Vec<usize>> {
    nodes
        .split('-')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().with_context(|| format!("bad layer width {:?}", s)))
        .collect()
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config {
        learning_rate: args.learning_rate,
        variance: args.variance,
        min_valid_accuracy: args.min_acc,
        max_epoch: args.max_epoch,
        batch_size: args.batch_size,
        ..Config::default()
    };
    config.validate()?;
    let backend = if args.parallel {
        Backend::Parallel
    } else {
        Backend::Sequential
    };
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut raw = RawData::load(&args.training_set_file, args.input_dim)
        .with_context(|| format!("loading {}", args.training_set_file))?;
    raw.check_label_base(args.base)?;
    let mut data = raw.into_dataset()?.with_backend(backend);
    data.normalize(Normalization::try_from(args.normalize)?);
    data.shuffle(&mut rng)?;
    info!(
        "{} rows, {} features, {} target columns",
        data.len(),
        data.dim(),
        data.label_dim()
    );

    let (train, valid) = data.split(args.ratio)?;
    info!("configuration\n{}", config);

    let mut dims = vec![train.dim()];
    dims.extend(parse_nodes(&args.nodes)?);
    dims.push(train.label_dim());
    if dims.iter().any(|&d| d == 0) {
        bail!("layer widths must be positive, got {:?}", dims);
    }
    let mut dnn = DNN::new(&dims, config.variance, &mut rng)?.with_backend(backend);
    info!("network dims {:?}, {:?} backend", dnn.dims(), dnn.backend());

    let mut session = TrainingSession::new(config, ErrorMeasure::CrossEntropy)?;
    info!("Training...");
    let summary = session.train(&mut dnn, &train, &valid, &mut LogReporter)?;
    info!("finished after {} epochs ({:?})", summary.epochs, summary.state);
    Ok(())
}
