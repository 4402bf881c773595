#![deny(rustdoc::missing_crate_level_docs)]
#![deny(missing_docs)]
//! Trains the trajectory predictor and writes its reports.
use clap::Parser;
use mimalloc::MiMalloc;
use pedtraj::{
    cfg::{CellKind, Config},
    dataset,
    model::{Cell, Predictor},
    report, train,
    trajectory::Batch,
    Result,
};
use tch::{manual_seed, nn, Device};
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn run<C: Cell>(cfg: &Config, mut train_set: Vec<Batch>, test_set: &[Batch]) -> Result<()> {
    let device = if cfg.use_cuda {
        Device::cuda_if_available()
    } else {
        Device::Cpu
    };
    info!(?device, cell = %cfg.model.cell, "building network");
    let vs = nn::VarStore::new(device);
    let predictor: Predictor<C> = Predictor::new(&vs.root(), &cfg.model)?;
    let mut opt = train::optimizer(&vs, &cfg.train)?;
    let mut trainer = train::Trainer::new(&cfg.train, cfg.data.pred_len);
    let history = trainer.fit(&predictor, &mut opt, &mut train_set, test_set)?;

    let checkpoint = report::checkpoint_path(cfg);
    if let Some(dir) = checkpoint.parent() {
        std::fs::create_dir_all(dir)?;
    }
    vs.save(&checkpoint)?;
    info!(path = %checkpoint.display(), "saved network");

    report::render(cfg, &history)?;
    let summary = report::summary_path(cfg);
    report::write_summary(&summary, &history, cfg.train.num_epochs)?;
    info!(path = %summary.display(), "saved summary");
    let results = report::results_path(cfg);
    report::append_results(&results, cfg, &history)?;
    info!(path = %results.display(), obs_len = cfg.data.obs_len, "appended results");
    Ok(())
}

fn main() -> Result<()> {
    let cfg = Config::parse();
    pedtraj::init_logging(&cfg.log_level);
    cfg.validate()?;
    manual_seed(cfg.train.seed as i64);
    let train_set = dataset::load(&cfg.data.split_dir("train"), &cfg.data)?;
    let test_set = dataset::load(&cfg.data.split_dir("test"), &cfg.data)?;
    match cfg.model.cell {
        CellKind::Gru => run::<nn::GRU>(&cfg, train_set, &test_set),
        CellKind::Lstm => run::<nn::LSTM>(&cfg, train_set, &test_set),
    }
}
