//! Epoch driver: mini-batch descent, evaluation, learning-rate adaptation and
//! validation-based early stopping.

use crate::utils::batches::Batches;
use crate::utils::config::Config;
use crate::utils::error::{Error, Result};
use crate::utils::measure::{get_error, zero_one_error, ErrorMeasure};
use crate::utils::misc::{accuracy, check_abnormal};
use crate::utils::network::DNN;
use crate::utils::nn_trait::{DataSet, LearningRatePolicy, Reporter};
use crate::utils::optimizer::PhasedDecay;
use log::info;

/// Batch size of scoring passes.
pub const EVAL_BATCH_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Running(usize),
    Converged,
    MaxEpochReached,
}

impl TrainState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TrainState::Running(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_acc: f32,
    pub ein: usize,
    pub n_train: usize,
    pub valid_acc: f32,
    pub eout: usize,
    pub n_valid: usize,
    pub learning_rate: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub epochs: usize,
    pub ein: usize,
    pub n_train: usize,
    pub eout: usize,
    pub n_valid: usize,
    pub state: TrainState,
}

/// Logs through `log::info!`.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn epoch(&mut self, r: &EpochReport) {
        info!(
            "Epoch #{}: Training Accuracy = {:.4} % ( {} / {} ), \
             Validation Accuracy = {:.4} % ( {} / {} )",
            r.epoch,
            r.train_acc * 100.0,
            r.n_train - r.ein,
            r.n_train,
            r.valid_acc * 100.0,
            r.n_valid - r.eout,
            r.n_valid
        );
    }

    fn summary(&mut self, s: &Summary) {
        info!("{} epochs in total, finished as {:?}", s.epochs, s.state);
        info!(
            "[   In-Sample   ] {:.4} % ( {} / {} )",
            accuracy(s.ein, s.n_train) * 100.0,
            s.n_train - s.ein,
            s.n_train
        );
        info!(
            "[ Out-of-Sample ] {:.4} % ( {} / {} )",
            accuracy(s.eout, s.n_valid) * 100.0,
            s.n_valid - s.eout,
            s.n_valid
        );
    }
}

/// True iff `eout[epoch]` is no larger than each of the `window` entries
/// ending at `epoch`. Entries before index 0 are skipped.
pub fn is_stopping(eout: &[usize], epoch: usize, window: usize) -> bool {
    let Some(&now) = eout.get(epoch) else {
        return false;
    };
    (0..window)
        .filter_map(|i| epoch.checked_sub(i))
        .all(|past| now <= eout[past])
}

/// Misclassified rows of `data`, scored in `EVAL_BATCH_SIZE` chunks.
pub fn dnn_predict<D: DataSet>(dnn: &DNN, data: &D, measure: ErrorMeasure) -> Result<usize> {
    let mut n_error = 0;
    for range in Batches::for_eval(EVAL_BATCH_SIZE, data.len())? {
        let prob = dnn.predict(&data.get_x(range.clone())?)?;
        n_error += zero_one_error(&prob, &data.get_y(range)?, measure)?;
    }
    Ok(n_error)
}

/// State of one training run.
pub struct TrainingSession {
    config: Config,
    learning_rate: f32,
    policy: Box<dyn LearningRatePolicy>,
    measure: ErrorMeasure,
    eout: Vec<usize>,
    ein: Option<usize>,
    state: TrainState,
}

impl TrainingSession {
    pub fn new(config: Config, measure: ErrorMeasure) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            learning_rate: config.learning_rate,
            config,
            policy: Box::new(PhasedDecay::default()),
            measure,
            eout: Vec::new(),
            ein: None,
            state: TrainState::Running(0),
        })
    }

    pub fn with_policy(mut self, policy: Box<dyn LearningRatePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn eout(&self) -> &[usize] {
        &self.eout
    }

    pub fn ein(&self) -> Option<usize> {
        self.ein
    }

    pub fn state(&self) -> TrainState {
        self.state
    }

    pub fn adjust_learning_rate(&mut self, train_acc: f32) {
        self.learning_rate = self.policy.adjust(self.learning_rate, train_acc);
    }

    /// Runs one epoch and moves the state machine by one step.
    pub fn run_epoch<D: DataSet, V: DataSet>(
        &mut self,
        dnn: &mut DNN,
        train: &D,
        valid: &V,
        reporter: &mut dyn Reporter,
    ) -> Result<TrainState> {
        let epoch = match self.state {
            TrainState::Running(epoch) => epoch,
            _ => {
                return Err(Error::StateMisuse {
                    op: "run_epoch",
                    reason: "training already finished",
                })
            }
        };
        check_shapes(dnn, train)?;
        check_shapes(dnn, valid)?;

        for range in Batches::new(self.config.batch_size, train.len())? {
            let fin = train.get_x(range.clone())?;
            let fout = dnn.feed_forward(&fin)?;
            let error = get_error(&train.get_y(range)?, &fout, self.measure)?;
            dnn.back_propagate(&error)?;
            dnn.update_parameters(self.learning_rate)?;
        }
        for w in dnn.weights() {
            check_abnormal(w, "update_parameters")?;
        }

        let ein = dnn_predict(dnn, train, self.measure)?;
        let eout = dnn_predict(dnn, valid, self.measure)?;
        self.ein = Some(ein);
        self.eout.push(eout);

        let train_acc = accuracy(ein, train.len());
        let valid_acc = accuracy(eout, valid.len());
        reporter.epoch(&EpochReport {
            epoch,
            train_acc,
            ein,
            n_train: train.len(),
            valid_acc,
            eout,
            n_valid: valid.len(),
            learning_rate: self.learning_rate,
        });

        self.adjust_learning_rate(train_acc);

        self.state = if valid_acc > self.config.min_valid_accuracy
            && is_stopping(&self.eout, epoch, self.config.n_non_inc_epoch)
        {
            TrainState::Converged
        } else if epoch + 1 >= self.config.max_epoch {
            TrainState::MaxEpochReached
        } else {
            TrainState::Running(epoch + 1)
        };
        Ok(self.state)
    }

    /// Runs epochs until the session converges or hits the epoch limit.
    pub fn train<D: DataSet, V: DataSet>(
        &mut self,
        dnn: &mut DNN,
        train: &D,
        valid: &V,
        reporter: &mut dyn Reporter,
    ) -> Result<Summary> {
        while !self.run_epoch(dnn, train, valid, reporter)?.is_terminal() {}

        let summary = Summary {
            epochs: self.eout.len(),
            ein: self.ein.unwrap_or(train.len()),
            n_train: train.len(),
            eout: self.eout.last().copied().unwrap_or(valid.len()),
            n_valid: valid.len(),
            state: self.state,
        };
        reporter.summary(&summary);
        Ok(summary)
    }
}

fn check_shapes<D: DataSet>(dnn: &DNN, data: &D) -> Result<()> {
    if data.dim() != dnn.input_dim() || data.label_dim() != dnn.output_dim() {
        return Err(Error::DimensionMismatch {
            op: "train",
            lhs: (data.dim(), data.label_dim()),
            rhs: (dnn.input_dim(), dnn.output_dim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::dataset::MemoryDataSet;
    use crate::utils::mat::Matrix;
    use crate::utils::optimizer::Constant;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct Recorder {
        epochs: Vec<EpochReport>,
        summaries: Vec<Summary>,
    }

    impl Reporter for Recorder {
        fn epoch(&mut self, report: &EpochReport) {
            self.epochs.push(report.clone());
        }

        fn summary(&mut self, summary: &Summary) {
            self.summaries.push(summary.clone());
        }
    }

    #[test]
    fn stopping_on_non_increasing_tail() {
        assert!(is_stopping(&[9, 7, 7, 5], 3, 3));
        assert!(is_stopping(&[9, 7, 6, 5], 3, 4));
        assert!(!is_stopping(&[9, 5, 6, 7], 3, 3));
        assert!(!is_stopping(&[9, 5, 4, 6], 3, 2));
    }

    #[test]
    fn stopping_only_looks_inside_the_window() {
        assert!(is_stopping(&[1, 9, 8, 7], 3, 3));
        assert!(!is_stopping(&[1, 9, 8, 7], 3, 4));
    }

    #[test]
    fn stopping_never_reads_before_index_zero() {
        assert!(is_stopping(&[4], 0, 6));
        assert!(is_stopping(&[4, 3], 1, 6));
        assert!(!is_stopping(&[3, 4], 1, 6));
        assert!(!is_stopping(&[3, 4], 5, 2));
        assert!(!is_stopping(&[], 0, 1));
    }

    fn blobs(n: usize, seed: u64) -> MemoryDataSet {
        use rand::Rng;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::new();
        let mut ids = Vec::new();
        for i in 0..n {
            let c = i % 2;
            let center = if c == 0 { -1.0 } else { 1.0 };
            rows.push(vec![
                center + rng.gen_range(-0.5..0.5),
                center + rng.gen_range(-0.5..0.5),
            ]);
            ids.push(c);
        }
        MemoryDataSet::from_class_ids(Matrix::from_rows(&rows).unwrap(), &ids, 2).unwrap()
    }

    fn session(max_epoch: usize, min_acc: f32) -> TrainingSession {
        let config = Config {
            learning_rate: 0.1,
            variance: 0.1,
            min_valid_accuracy: min_acc,
            max_epoch,
            n_non_inc_epoch: 3,
            batch_size: 10,
        };
        TrainingSession::new(config, ErrorMeasure::CrossEntropy).unwrap()
    }

    #[test]
    fn hits_epoch_limit_when_threshold_is_unreachable() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut dnn = DNN::new(&[2, 3, 1], 0.1, &mut rng).unwrap();
        let (train, valid) = (blobs(40, 2), blobs(20, 3));
        let mut rec = Recorder::default();
        let mut s = session(4, 1.0);
        let summary = s.train(&mut dnn, &train, &valid, &mut rec).unwrap();

        assert_eq!(summary.state, TrainState::MaxEpochReached);
        assert_eq!(summary.epochs, 4);
        assert_eq!(s.eout().len(), 4);
        assert_eq!(rec.epochs.len(), 4);
        assert_eq!(
            rec.epochs.iter().map(|r| r.epoch).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert_eq!(rec.summaries, vec![summary]);
        assert!(matches!(
            s.run_epoch(&mut dnn, &train, &valid, &mut rec),
            Err(Error::StateMisuse { .. })
        ));
    }

    #[test]
    fn state_advances_one_epoch_at_a_time() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut dnn = DNN::new(&[2, 3, 1], 0.1, &mut rng).unwrap();
        let (train, valid) = (blobs(30, 5), blobs(10, 6));
        let mut s = session(10, 1.0).with_policy(Box::new(Constant));
        let mut rec = Recorder::default();
        assert_eq!(s.state(), TrainState::Running(0));
        assert_eq!(
            s.run_epoch(&mut dnn, &train, &valid, &mut rec).unwrap(),
            TrainState::Running(1)
        );
        assert_eq!(s.learning_rate(), 0.1);
        assert_eq!(s.ein(), Some(rec.epochs[0].ein));
    }

    #[test]
    fn rejects_dataset_of_wrong_width() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut dnn = DNN::new(&[3, 2, 1], 0.1, &mut rng).unwrap();
        let (train, valid) = (blobs(20, 8), blobs(10, 9));
        let mut s = session(5, 0.5);
        assert!(matches!(
            s.train(&mut dnn, &train, &valid, &mut LogReporter),
            Err(Error::DimensionMismatch { op: "train", .. })
        ));
    }

    #[test]
    fn train_aborts_on_non_finite_weights() {
        let rows: Vec<Vec<f32>> = (0..10)
            .map(|i| if i % 2 == 0 { vec![-1e30, -1e30] } else { vec![1e30, 1e30] })
            .collect();
        let ids: Vec<usize> = (0..10).map(|i| i % 2).collect();
        let train =
            MemoryDataSet::from_class_ids(Matrix::from_rows(&rows).unwrap(), &ids, 2).unwrap();
        let valid = train.clone();
        let mut dnn = DNN::from_weights(vec![Matrix::new(3, 1)]).unwrap();
        let config = Config {
            learning_rate: 3e38,
            variance: 0.1,
            min_valid_accuracy: 0.5,
            max_epoch: 5,
            n_non_inc_epoch: 3,
            batch_size: 10,
        };
        let mut s = TrainingSession::new(config, ErrorMeasure::CrossEntropy).unwrap();
        let mut rec = Recorder::default();

        assert!(matches!(
            s.train(&mut dnn, &train, &valid, &mut rec),
            Err(Error::NonFinite { op: "update_parameters" })
        ));
        assert!(rec.epochs.is_empty());
        assert!(rec.summaries.is_empty());
        assert!(s.eout().is_empty());
    }

    #[test]
    fn evaluation_counts_errors_over_all_batches() {
        let w = Matrix::from_rows(&[vec![10.0], vec![10.0], vec![0.0]]).unwrap();
        let dnn = DNN::from_weights(vec![w]).unwrap();
        let data = blobs(3000, 10);
        assert_eq!(dnn_predict(&dnn, &data, ErrorMeasure::CrossEntropy).unwrap(), 0);
    }
}
