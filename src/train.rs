//! Training and evaluation loops.
use super::{
    cfg,
    metrics::{BatchMetrics, History, Summary, Tally},
    model::{Cell, Predictor},
    trajectory::{Batch, Trajectory},
    Error, Result,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{convert::TryFrom, time::Instant};
use tch::{nn, nn::OptimizerConfig, no_grad, Reduction, Tensor};
use tracing::{debug, info};

/// Builds the gradient descent method over every variable in the store.
pub fn optimizer(vs: &nn::VarStore, train: &cfg::TrainCfg) -> Result<nn::Optimizer> {
    let adam = nn::Adam {
        wd: train.lambda_param,
        ..Default::default()
    };
    Ok(adam.build(vs, train.learning_rate)?)
}

/// Learning rate in effect during the given zero based epoch.
pub fn learning_rate(train: &cfg::TrainCfg, epoch: usize) -> f64 {
    match train.freq_optimizer {
        Some(freq) => {
            let decays = i32::try_from(epoch / freq).unwrap_or(i32::MAX);
            train.learning_rate * train.decay_rate.powi(decays)
        }
        None => train.learning_rate,
    }
}

/// Fails unless the target covers exactly the prediction horizon.
fn check_horizon(batch: &Batch, pred_len: usize) -> Result<()> {
    let target = batch.target();
    if target.steps() != pred_len {
        return Err(Error::Shape {
            expected: pred_len * target.peds() * cfg::COORDS,
            found: target.steps() * target.peds() * cfg::COORDS,
        });
    }
    Ok(())
}

/// Scores a forward pass on the host.
fn score(loss: &Tensor, predicted: &Tensor, batch: &Batch) -> Result<BatchMetrics> {
    let predicted = Trajectory::from_tensor(predicted)?;
    let loss = loss.f_double_value(&[])?;
    BatchMetrics::new(loss, &predicted, batch.target())
}

/// Performs one gradient descent iteration on a batch.
pub fn step<C: Cell>(
    predictor: &Predictor<C>,
    opt: &mut nn::Optimizer,
    batch: &Batch,
    pred_len: usize,
    grad_clip: Option<f64>,
) -> Result<BatchMetrics> {
    check_horizon(batch, pred_len)?;
    let observed = batch.observed().to_tensor(predictor.device())?;
    let target = batch.target().to_tensor(predictor.device())?;
    let predicted = predictor.forward_t(&observed, pred_len, true)?;
    let loss = predicted.f_mse_loss(&target, Reduction::Mean)?;
    if let Some(max) = grad_clip {
        opt.backward_step_clip(&loss, max);
    } else {
        opt.backward_step(&loss);
    }
    score(&loss, &predicted, batch)
}

/// Scores the predictor on held out batches without touching its variables.
pub fn evaluate<C: Cell>(
    predictor: &Predictor<C>,
    batches: &[Batch],
    pred_len: usize,
) -> Result<Summary> {
    let mut tally = Tally::default();
    for batch in batches {
        check_horizon(batch, pred_len)?;
        let metrics = no_grad(|| -> Result<BatchMetrics> {
            let observed = batch.observed().to_tensor(predictor.device())?;
            let target = batch.target().to_tensor(predictor.device())?;
            let predicted = predictor.forward_t(&observed, pred_len, false)?;
            let loss = predicted.f_mse_loss(&target, Reduction::Mean)?;
            score(&loss, &predicted, batch)
        })?;
        tally.push(metrics);
    }
    let summary = tally.take();
    debug!(
        test_loss = summary.loss.mean,
        ade = summary.ade,
        fde = summary.fde,
        peds = summary.peds,
        "evaluated"
    );
    Ok(summary)
}

/// Drives epochs of training followed by evaluation.
pub struct Trainer {
    /// Optimization options.
    cfg: cfg::TrainCfg,

    /// Number of steps to predict.
    pred_len: usize,

    /// Random number generator, for shuffling batches.
    rng: StdRng,

    /// Metrics of the epoch in progress.
    tally: Tally,

    /// Metrics of completed epochs.
    history: History,
}

impl Trainer {
    /// Initializes the loop state.
    pub fn new(train: &cfg::TrainCfg, pred_len: usize) -> Self {
        Self {
            cfg: train.clone(),
            pred_len,
            rng: StdRng::seed_from_u64(train.seed),
            tally: Default::default(),
            history: Default::default(),
        }
    }

    /// Trains on every batch once, in shuffled order.
    pub fn train_epoch<C: Cell>(
        &mut self,
        predictor: &Predictor<C>,
        opt: &mut nn::Optimizer,
        batches: &mut [Batch],
    ) -> Result<Summary> {
        batches.shuffle(&mut self.rng);
        for (i, batch) in batches.iter().enumerate() {
            let metrics = step(predictor, opt, batch, self.pred_len, self.cfg.grad_clip)?;
            debug!(batch = i, loss = metrics.loss, "current training loss");
            self.tally.push(metrics);
        }
        Ok(self.tally.take())
    }

    /// Runs the configured number of epochs and returns the metric series.
    pub fn fit<C: Cell>(
        &mut self,
        predictor: &Predictor<C>,
        opt: &mut nn::Optimizer,
        train: &mut [Batch],
        test: &[Batch],
    ) -> Result<History> {
        let epochs = self.cfg.num_epochs;
        for epoch in 0..epochs {
            let started = Instant::now();
            let lr = learning_rate(&self.cfg, epoch);
            opt.set_lr(lr);
            let train = self.train_epoch(predictor, opt, train)?;
            let test = evaluate(predictor, test, self.pred_len)?;
            self.history.record(&train, &test);
            info!(
                epoch,
                epochs,
                lr,
                train_loss = train.loss.mean,
                std_train_loss = train.loss.std,
                test_loss = test.loss.mean,
                train_ade = train.ade,
                train_fde = train.fde,
                test_ade = test.ade,
                test_fde = test.fde,
                train_peds = train.peds,
                elapsed = %humantime::format_duration(started.elapsed()),
                "epoch complete"
            );
        }
        Ok(std::mem::take(&mut self.history))
    }
}

#[cfg(test)]
mod tests {
    use super::{evaluate, learning_rate, optimizer, step, Trainer};
    use crate::{
        cfg,
        model::Predictor,
        trajectory::{Batch, Trajectory},
        Error,
    };
    use tch::{nn, Device, Kind, Tensor};

    fn train_cfg(num_epochs: usize) -> cfg::TrainCfg {
        cfg::TrainCfg {
            num_epochs,
            learning_rate: 0.01,
            decay_rate: 0.5,
            freq_optimizer: None,
            grad_clip: None,
            lambda_param: 0.0,
            seed: 7,
        }
    }

    fn model_cfg(dropout: f64) -> cfg::ModelCfg {
        cfg::ModelCfg {
            cell: cfg::CellKind::Gru,
            rnn_size: 16,
            embedding_size: 8,
            dropout,
            neighborhood_size: 32,
            grid_size: 4,
            max_num_peds: 27,
        }
    }

    fn batch(obs_len: usize, pred_len: usize, peds: usize, offset: f32) -> Batch {
        let observed = (0..obs_len * peds * 2).map(|x| offset + x as f32 / 100.0);
        let target = (0..pred_len * peds * 2).map(|x| offset + 0.5 + x as f32 / 100.0);
        Batch::new(
            Trajectory::new(obs_len, peds, observed.collect()).unwrap(),
            Trajectory::new(pred_len, peds, target.collect()).unwrap(),
        )
        .unwrap()
    }

    fn snapshot(vs: &nn::VarStore) -> Vec<Tensor> {
        vs.trainable_variables()
            .iter()
            .map(|t| t.detach().copy())
            .collect()
    }

    #[test]
    fn one_epoch_over_two_batches() {
        tch::manual_seed(0);
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.5)).unwrap();
        let cfg = train_cfg(1);
        let mut opt = optimizer(&vs, &cfg).unwrap();
        let mut trainer = Trainer::new(&cfg, 12);
        let mut train = vec![batch(8, 12, 3, 0.0), batch(8, 12, 2, 1.0)];
        let summary = trainer.train_epoch(&predictor, &mut opt, &mut train).unwrap();
        assert_eq!(summary.loss.count, 2);
        assert_eq!(summary.peds, 5);
        assert!(trainer.tally.loss.is_empty());

        let mut trainer = Trainer::new(&cfg, 12);
        let test = vec![batch(8, 12, 4, 2.0)];
        let history = trainer.fit(&predictor, &mut opt, &mut train, &test).unwrap();
        assert_eq!(history.epochs(), 1);
        assert_eq!(history.avg_test_loss.len(), 1);
        assert_eq!(history.train_peds, vec![5]);
        assert_eq!(history.test_peds, vec![4]);
        assert!(trainer.tally.loss.is_empty());
        assert!(trainer.tally.ade.is_empty());
        assert_eq!(trainer.history.epochs(), 0);
    }

    #[test]
    fn epoch_loss_is_mean_of_batch_losses() {
        tch::manual_seed(1);
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.0)).unwrap();
        let test = vec![batch(4, 3, 2, 0.0), batch(4, 3, 5, 1.0), batch(4, 3, 1, 2.0)];
        let losses: Vec<f64> = test
            .iter()
            .map(|b| evaluate(&predictor, std::slice::from_ref(b), 3).unwrap().loss.mean)
            .collect();
        let summary = evaluate(&predictor, &test, 3).unwrap();
        let mean = losses.iter().sum::<f64>() / 3.0;
        assert!((summary.loss.mean - mean).abs() < 1e-9);
        assert_eq!(summary.peds, 8);
    }

    #[test]
    fn training_reduces_loss() {
        tch::manual_seed(2);
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.0)).unwrap();
        let cfg = train_cfg(1);
        let mut opt = optimizer(&vs, &cfg).unwrap();
        let b = batch(4, 3, 2, 0.0);
        let first = step(&predictor, &mut opt, &b, 3, None).unwrap().loss;
        let mut last = first;
        for _ in 0..100 {
            last = step(&predictor, &mut opt, &b, 3, Some(10.0)).unwrap().loss;
        }
        assert!(last < first, "{} >= {}", last, first);
    }

    #[test]
    fn evaluation_leaves_variables_alone() {
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.5)).unwrap();
        let before = snapshot(&vs);
        evaluate(&predictor, &[batch(8, 12, 3, 0.0)], 12).unwrap();
        for (a, b) in before.iter().zip(snapshot(&vs).iter()) {
            assert!(a.allclose(b, 0.0, 0.0, false));
        }
    }

    #[test]
    fn horizon_must_match_target() {
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.0)).unwrap();
        match evaluate(&predictor, &[batch(8, 12, 3, 0.0)], 8) {
            Err(Error::Shape { expected, found }) => assert_eq!((expected, found), (48, 72)),
            x => panic!("{:?}", x),
        }
    }

    fn squared_norm(vs: &nn::VarStore) -> f64 {
        vs.trainable_variables()
            .iter()
            .map(|t| t.square().sum(Kind::Double).double_value(&[]))
            .sum()
    }

    #[test]
    fn weight_decay_shrinks_variables() {
        let b = batch(4, 3, 2, 0.0);
        let norms: Vec<f64> = [0.0, 10.0]
            .iter()
            .map(|lambda| {
                tch::manual_seed(3);
                let vs = nn::VarStore::new(Device::Cpu);
                let predictor: Predictor<nn::GRU> =
                    Predictor::new(&vs.root(), &model_cfg(0.0)).unwrap();
                let mut cfg = train_cfg(1);
                cfg.lambda_param = *lambda;
                let mut opt = optimizer(&vs, &cfg).unwrap();
                for _ in 0..50 {
                    step(&predictor, &mut opt, &b, 3, None).unwrap();
                }
                squared_norm(&vs)
            })
            .collect();
        assert!(norms[1] < norms[0], "{:?}", norms);
    }

    /// Pedestrian counts of the batches in the order one epoch leaves them.
    fn epoch_order(seed: u64) -> Vec<usize> {
        tch::manual_seed(4);
        let vs = nn::VarStore::new(Device::Cpu);
        let predictor: Predictor<nn::GRU> = Predictor::new(&vs.root(), &model_cfg(0.0)).unwrap();
        let mut cfg = train_cfg(1);
        cfg.seed = seed;
        let mut opt = optimizer(&vs, &cfg).unwrap();
        let mut trainer = Trainer::new(&cfg, 2);
        let mut train: Vec<Batch> = (1..=8).map(|peds| batch(3, 2, peds, 0.0)).collect();
        trainer.train_epoch(&predictor, &mut opt, &mut train).unwrap();
        train.iter().map(Batch::peds).collect()
    }

    #[test]
    fn shuffle_follows_the_seed() {
        let order = epoch_order(7);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=8).collect::<Vec<_>>());
        assert_eq!(epoch_order(7), order);
        assert!((8..12).any(|seed| epoch_order(seed) != order));
    }

    #[test]
    fn learning_rate_decays_stepwise() {
        let mut cfg = train_cfg(10);
        assert_eq!(learning_rate(&cfg, 9), 0.01);
        cfg.freq_optimizer = Some(4);
        assert_eq!(learning_rate(&cfg, 3), 0.01);
        assert_eq!(learning_rate(&cfg, 4), 0.005);
        assert_eq!(learning_rate(&cfg, 9), 0.0025);
    }
}
