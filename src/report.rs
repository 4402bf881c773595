//! Run artifacts: checkpoint location, text reports and training charts.
use super::{
    cfg::{self, Config},
    chart::{Chart, Series},
    metrics::History,
    Result,
};
use csv::WriterBuilder;
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;

/// Columns of the cross run results file.
pub const COLUMNS: [&str; 11] = [
    "obs_len",
    "pred_len",
    "avg_train_loss",
    "avg_test_loss",
    "std_train_loss",
    "avg_train_displacement",
    "final_train_displacement",
    "avg_test_displacement",
    "final_test_displacement",
    "num_train_peds",
    "num_test_peds",
];

/// Prefix shared by every artifact of the run.
fn stem(cfg: &Config) -> String {
    format!("{}_{}", cfg.model.cell, cfg.data.dataset_name)
}

/// Where the trained variables are saved.
pub fn checkpoint_path(cfg: &Config) -> PathBuf {
    let name = format!(
        "{}_model_{}_lr_{}_epoch_{}_predlen_{}_obs{}.ot",
        cfg.model.cell,
        cfg.data.dataset_name,
        cfg.train.learning_rate,
        cfg.train.num_epochs,
        cfg.data.pred_len,
        cfg.data.obs_len
    );
    cfg.output.models_dir.join(name)
}

/// Where the per run summary is written.
pub fn summary_path(cfg: &Config) -> PathBuf {
    let name = format!("{}_avgtrainlosses_{}.txt", stem(cfg), cfg.run_tag());
    cfg.output.txt_dir.join(name)
}

/// Where rows for every run of a sweep are appended.
pub fn results_path(cfg: &Config) -> PathBuf {
    let name = format!(
        "{}_results_{}_lr_{}_epochs_{}.txt",
        cfg.model.cell, cfg.data.dataset_name, cfg.train.learning_rate, cfg.train.num_epochs
    );
    cfg.output.txt_dir.join(name)
}

/// Where a chart of the given metric family is rendered.
pub fn figure_path(cfg: &Config, family: &str) -> PathBuf {
    let name = format!("{}_{}_{}.svg", stem(cfg), family, cfg.run_tag());
    cfg.output.figs_dir.join(name)
}

/// Creates the parent directory of a path.
fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Formats a series as a bracketed list.
fn series<T: std::fmt::Debug>(xs: &[T]) -> String {
    format!("{:?}", xs)
}

/// Writes every per epoch series of one run, replacing any previous file.
pub fn write_summary(path: &Path, history: &History, epochs: usize) -> Result<()> {
    create_parent(path)?;
    let mut f = BufWriter::new(File::create(path)?);
    let last = |xs: &[usize]| xs.last().copied().unwrap_or_default();
    writeln!(
        f,
        "Number of pedestrians in the training data: {}",
        last(&history.train_peds)
    )?;
    writeln!(
        f,
        "Number of pedestrians in the testing data: {}",
        last(&history.test_peds)
    )?;
    let sections: [(&str, &[f64]); 7] = [
        ("Average train loss vs. epoch", &history.avg_train_loss),
        ("Std train loss vs. epoch", &history.std_train_loss),
        ("Avg test loss vs. epoch", &history.avg_test_loss),
        ("Avg train displacement error", &history.train_ade),
        ("Final train displacement error", &history.train_fde),
        ("Avg test displacement error", &history.test_ade),
        ("Final test displacement error", &history.test_fde),
    ];
    for (i, (title, xs)) in sections.iter().enumerate() {
        writeln!(f, "\n=============={}:===============", title)?;
        writeln!(f, "{}", series(*xs))?;
        if i == 0 {
            writeln!(f, "epochs: {}", epochs)?;
        }
    }
    f.flush()?;
    Ok(())
}

/// Appends the final epoch of this run to the cross run results file.
///
/// A run predicting `SWEEP_START` steps opens a sweep, so it writes a comment
/// line and the header row before its own row.
pub fn append_results(path: &Path, cfg: &Config, history: &History) -> Result<()> {
    create_parent(path)?;
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;
    let header = cfg.data.pred_len == cfg::SWEEP_START;
    if header {
        writeln!(
            f,
            "# dataset: {}; epochs: {}",
            cfg.data.dataset_name, cfg.train.num_epochs
        )?;
    }
    let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(f);
    if header {
        wtr.write_record(&COLUMNS)?;
    }
    let last = |xs: &[f64]| xs.last().copied().unwrap_or_default().to_string();
    let peds = |xs: &[usize]| xs.last().copied().unwrap_or_default().to_string();
    wtr.write_record(&[
        cfg.data.obs_len.to_string(),
        cfg.data.pred_len.to_string(),
        last(&history.avg_train_loss),
        last(&history.avg_test_loss),
        last(&history.std_train_loss),
        last(&history.train_ade),
        last(&history.train_fde),
        last(&history.test_ade),
        last(&history.test_fde),
        peds(&history.train_peds),
        peds(&history.test_peds),
    ])?;
    wtr.flush()?;
    Ok(())
}

/// Renders the loss, displacement and loss spread charts of one run.
pub fn render(cfg: &Config, history: &History) -> Result<Vec<PathBuf>> {
    let epochs = cfg.train.num_epochs;
    let x: Vec<f64> = (0..history.epochs()).map(|e| e as f64).collect();
    let line = |label: &str, ys: &[f64]| Series::new(label, x.clone(), ys.to_vec());
    let charts = vec![
        (
            "avgtrainloss",
            Chart::new(format!("Average train loss vs {} epochs", epochs))
                .series(line("avg train_loss", &history.avg_train_loss))
                .series(line("avg test_loss", &history.avg_test_loss)),
        ),
        (
            "avg_final_displacement",
            Chart::new(format!("Average and final displacement error {} epochs", epochs))
                .series(line("train:final disp. error", &history.train_fde))
                .series(line("train:avg disp. error", &history.train_ade))
                .series(line("test:final disp. error", &history.test_fde))
                .series(line("test:avg disp. error", &history.test_ade))
                .y_range(0.0, 10.0),
        ),
        (
            "stdtrainloss",
            Chart::new(format!("Std of train loss vs {} epochs", epochs))
                .series(line("std train_loss", &history.std_train_loss)),
        ),
    ];
    let mut ret = Vec::with_capacity(charts.len());
    for (family, chart) in charts {
        let path = figure_path(cfg, family);
        chart.x_label("Epoch").save(&path)?;
        ret.push(path);
    }
    info!(dir = %cfg.output.figs_dir.display(), "saved training charts");
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::{append_results, checkpoint_path, render, results_path, write_summary, COLUMNS};
    use crate::{cfg::Config, metrics::History};
    use clap::Parser;
    use std::fs;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path, pred_len: usize) -> Config {
        let dir = dir.to_str().unwrap();
        Config::try_parse_from(&[
            "pedtraj",
            "--pred-len",
            pred_len.to_string().as_str(),
            "--txt-dir",
            dir,
            "--figs-dir",
            dir,
            "--models-dir",
            dir,
        ])
        .unwrap()
    }

    fn history() -> History {
        History {
            avg_train_loss: vec![2.0, 1.0],
            std_train_loss: vec![0.5, 0.25],
            avg_test_loss: vec![3.0, 1.5],
            train_ade: vec![1.0, 0.5],
            train_fde: vec![2.0, 1.0],
            test_ade: vec![1.5, 0.75],
            test_fde: vec![2.5, 1.25],
            train_peds: vec![10, 10],
            test_peds: vec![4, 4],
        }
    }

    fn headers(text: &str) -> usize {
        text.lines().filter(|l| l.starts_with("obs_len\t")).count()
    }

    #[test]
    fn header_opens_a_sweep_once() {
        let dir = tempdir().unwrap();
        let first = config(dir.path(), 2);
        let path = results_path(&first);
        append_results(&path, &first, &history()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(headers(&text), 1);
        assert_eq!(text.lines().next().unwrap(), "# dataset: eth; epochs: 20");
        assert_eq!(text.lines().nth(1).unwrap(), COLUMNS.join("\t"));

        for pred_len in &[4, 8, 12] {
            let next = config(dir.path(), *pred_len);
            assert_eq!(results_path(&next), path);
            append_results(&path, &next, &history()).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(headers(&text), 1);
        assert_eq!(text.lines().count(), 6);
        assert_eq!(
            text.lines().last().unwrap(),
            "8\t12\t1\t1.5\t0.25\t0.5\t1\t0.75\t1.25\t10\t4"
        );
    }

    #[test]
    fn other_horizons_never_write_a_header() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), 12);
        let path = results_path(&cfg);
        append_results(&path, &cfg, &history()).unwrap();
        append_results(&path, &cfg, &history()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(headers(&text), 0);
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn summary_lists_every_series() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("summary.txt");
        write_summary(&path, &history(), 2).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Number of pedestrians in the training data: 10\n"));
        assert!(text.contains("Number of pedestrians in the testing data: 4\n"));
        assert!(text.contains("[2.0, 1.0]\nepochs: 2\n"));
        assert!(text.contains("Final test displacement error:===============\n[2.5, 1.25]\n"));
    }

    #[test]
    fn artifact_names_encode_the_run() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path(), 12);
        assert_eq!(
            checkpoint_path(&cfg).file_name().unwrap(),
            "gru_model_eth_lr_0.003_epoch_20_predlen_12_obs8.ot"
        );
        let paths = render(&cfg, &history()).unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(
            paths[0].file_name().unwrap(),
            "gru_eth_avgtrainloss_lr_0.003_epochs_20_predlen_12_obs8.svg"
        );
        for p in &paths {
            assert!(fs::read_to_string(p).unwrap().starts_with("<svg"));
        }
    }
}
