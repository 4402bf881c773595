//! Displacement errors and per epoch reductions.
use super::{cfg, trajectory::Trajectory, Error, Result};

/// Euclidean distance between two positions.
fn distance(a: [f32; 2], b: [f32; 2]) -> f64 {
    let dx = f64::from(a[0]) - f64::from(b[0]);
    let dy = f64::from(a[1]) - f64::from(b[1]);
    dx.hypot(dy)
}

/// Fails unless prediction and truth cover the same steps and pedestrians.
fn check_aligned(predicted: &Trajectory, target: &Trajectory) -> Result<()> {
    if predicted.peds() != target.peds() {
        return Err(Error::Misaligned {
            observed: predicted.peds(),
            target: target.peds(),
        });
    }
    if predicted.steps() != target.steps() {
        return Err(Error::Shape {
            expected: target.steps() * target.peds() * cfg::COORDS,
            found: predicted.steps() * predicted.peds() * cfg::COORDS,
        });
    }
    Ok(())
}

/// Mean distance between prediction and truth over every step and pedestrian.
///
/// An empty prediction has nothing to displace and scores zero.
pub fn average_displacement(predicted: &Trajectory, target: &Trajectory) -> Result<f64> {
    check_aligned(predicted, target)?;
    let (steps, peds) = (predicted.steps(), predicted.peds());
    if steps == 0 || peds == 0 {
        return Ok(0.0);
    }
    let total: f64 = (0..steps)
        .flat_map(|s| (0..peds).map(move |p| (s, p)))
        .map(|(s, p)| distance(predicted.position(s, p), target.position(s, p)))
        .sum();
    Ok(total / (steps * peds) as f64)
}

/// Mean distance between prediction and truth at the last predicted step.
pub fn final_displacement(predicted: &Trajectory, target: &Trajectory) -> Result<f64> {
    check_aligned(predicted, target)?;
    let (steps, peds) = (predicted.steps(), predicted.peds());
    if steps == 0 || peds == 0 {
        return Ok(0.0);
    }
    let total: f64 = predicted
        .step(steps - 1)
        .zip(target.step(steps - 1))
        .map(|(a, b)| distance(a, b))
        .sum();
    Ok(total / peds as f64)
}

/// Reduction of one epoch's worth of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reduced {
    /// Arithmetic mean.
    pub mean: f64,

    /// Population standard deviation.
    pub std: f64,

    /// Number of samples reduced.
    pub count: usize,
}

/// Ordered samples collected during an epoch.
#[derive(Debug, Default)]
pub struct Accumulator(Vec<f64>);

impl Accumulator {
    /// Records one sample.
    pub fn push(&mut self, x: f64) {
        self.0.push(x);
    }

    /// Whether no samples are held.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reduces the held samples and clears them for the next epoch.
    pub fn take(&mut self) -> Reduced {
        let xs = std::mem::take(&mut self.0);
        if xs.is_empty() {
            return Default::default();
        }
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
        Reduced {
            mean,
            std: var.sqrt(),
            count: xs.len(),
        }
    }
}

/// Observations from one batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchMetrics {
    /// Mean squared error.
    pub loss: f64,

    /// Average displacement error.
    pub ade: f64,

    /// Final displacement error.
    pub fde: f64,

    /// Pedestrians in the batch.
    pub peds: usize,
}

impl BatchMetrics {
    /// Scores a prediction against its target.
    pub fn new(loss: f64, predicted: &Trajectory, target: &Trajectory) -> Result<Self> {
        Ok(Self {
            loss,
            ade: average_displacement(predicted, target)?,
            fde: final_displacement(predicted, target)?,
            peds: predicted.peds(),
        })
    }
}

/// Accumulates batch metrics across one pass over a dataset.
#[derive(Debug, Default)]
pub struct Tally {
    /// Batch losses.
    pub loss: Accumulator,

    /// Batch average displacement errors.
    pub ade: Accumulator,

    /// Batch final displacement errors.
    pub fde: Accumulator,

    /// Pedestrians seen.
    pub peds: usize,
}

impl Tally {
    /// Records one batch.
    pub fn push(&mut self, metrics: BatchMetrics) {
        self.loss.push(metrics.loss);
        self.ade.push(metrics.ade);
        self.fde.push(metrics.fde);
        self.peds += metrics.peds;
    }

    /// Reduces the pass and resets every accumulator.
    pub fn take(&mut self) -> Summary {
        Summary {
            loss: self.loss.take(),
            ade: self.ade.take().mean,
            fde: self.fde.take().mean,
            peds: std::mem::take(&mut self.peds),
        }
    }
}

/// Reduced metrics of one pass over a dataset.
#[derive(Clone, Copy, Debug, Default)]
pub struct Summary {
    /// Batch loss mean and spread.
    pub loss: Reduced,

    /// Mean average displacement error.
    pub ade: f64,

    /// Mean final displacement error.
    pub fde: f64,

    /// Pedestrians seen.
    pub peds: usize,
}

/// Per epoch metric series of a training run.
#[derive(Clone, Debug, Default)]
pub struct History {
    /// Mean training loss.
    pub avg_train_loss: Vec<f64>,

    /// Standard deviation of training batch losses.
    pub std_train_loss: Vec<f64>,

    /// Mean evaluation loss.
    pub avg_test_loss: Vec<f64>,

    /// Training average displacement error.
    pub train_ade: Vec<f64>,

    /// Training final displacement error.
    pub train_fde: Vec<f64>,

    /// Evaluation average displacement error.
    pub test_ade: Vec<f64>,

    /// Evaluation final displacement error.
    pub test_fde: Vec<f64>,

    /// Training pedestrians seen.
    pub train_peds: Vec<usize>,

    /// Evaluation pedestrians seen.
    pub test_peds: Vec<usize>,
}

impl History {
    /// Appends one epoch.
    pub fn record(&mut self, train: &Summary, test: &Summary) {
        self.avg_train_loss.push(train.loss.mean);
        self.std_train_loss.push(train.loss.std);
        self.avg_test_loss.push(test.loss.mean);
        self.train_ade.push(train.ade);
        self.train_fde.push(train.fde);
        self.test_ade.push(test.ade);
        self.test_fde.push(test.fde);
        self.train_peds.push(train.peds);
        self.test_peds.push(test.peds);
    }

    /// Number of recorded epochs.
    pub fn epochs(&self) -> usize {
        self.avg_train_loss.len()
    }
}
