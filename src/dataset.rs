//! Trajectory dataset loader.
//!
//! Every file in a split directory holds delimited `frame ped x y` rows.
//! A sequence is a window of consecutive frames; the pedestrians present in
//! every frame of the window become its tracks.
use super::{
    cfg,
    trajectory::{Batch, Trajectory},
    Error, Result,
};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::{collections::BTreeMap, convert::TryFrom, fs, path::Path, path::PathBuf};
use tracing::{debug, info};

/// One annotated position.
#[derive(Debug, Deserialize)]
struct Row {
    /// Frame number, stored as a float in the source files.
    frame: f64,

    /// Pedestrian identifier, stored as a float in the source files.
    ped: f64,

    /// Horizontal world coordinate.
    x: f32,

    /// Vertical world coordinate.
    y: f32,
}

/// Positions of one pedestrian over a whole sequence.
type Track = Vec<[f32; 2]>;

/// Reads every row of one annotation file.
fn read_rows(path: &Path, delim: char) -> Result<Vec<Row>> {
    let delim = u8::try_from(delim)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| Error::Config(format!("delimiter {:?} is not ascii", delim)))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .trim(Trim::All)
        .from_path(path)?;
    let rows: std::result::Result<Vec<Row>, csv::Error> = rdr.deserialize().collect();
    Ok(rows?)
}

/// Cuts one file's rows into sequences of `seq_len` frames.
fn sequences(rows: &[Row], data: &cfg::DataCfg) -> Vec<Vec<Track>> {
    let mut frames: BTreeMap<i64, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        frames.entry(row.frame.round() as i64).or_default().push(row);
    }
    let frames: Vec<_> = frames.into_values().collect();
    let seq_len = data.seq_len();
    let mut ret = Vec::new();
    let mut start = 0;
    while start + seq_len <= frames.len() {
        let mut tracks: BTreeMap<i64, Track> = BTreeMap::new();
        for (offset, frame) in frames[start..start + seq_len].iter().enumerate() {
            for row in frame {
                let track = tracks.entry(row.ped.round() as i64).or_default();
                if track.len() == offset {
                    track.push([row.x, row.y]);
                }
            }
        }
        let tracks: Vec<_> = tracks
            .into_values()
            .filter(|t| t.len() == seq_len)
            .collect();
        if tracks.len() > cfg::MIN_PEDS {
            ret.push(tracks);
        }
        start += data.skip;
    }
    ret
}

/// Groups sequences into batches, concatenating their pedestrians.
fn batches(sequences: &[Vec<Track>], data: &cfg::DataCfg) -> Result<Vec<Batch>> {
    sequences
        .chunks(data.batch_size)
        .map(|chunk| {
            let (observed, target): (Vec<Track>, Vec<Track>) = chunk
                .iter()
                .flatten()
                .map(|t| (t[..data.obs_len].to_vec(), t[data.obs_len..].to_vec()))
                .unzip();
            Batch::new(
                Trajectory::from_tracks(data.obs_len, &observed)?,
                Trajectory::from_tracks(data.pred_len, &target)?,
            )
        })
        .collect()
}

/// Loads every annotation file in the directory into batches.
pub fn load(dir: &Path, data: &cfg::DataCfg) -> Result<Vec<Batch>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| Ok(entry?.path()))
        .collect::<Result<Vec<PathBuf>>>()?;
    paths.sort();
    let mut all = Vec::new();
    for path in paths.iter().filter(|p| p.is_file()) {
        let rows = read_rows(path, data.delim)?;
        let found = sequences(&rows, data);
        debug!(path = %path.display(), rows = rows.len(), sequences = found.len(), "read");
        all.extend(found);
    }
    if all.is_empty() {
        return Err(Error::EmptyDataset(dir.to_owned()));
    }
    let ret = batches(&all, data)?;
    info!(
        dir = %dir.display(),
        sequences = all.len(),
        batches = ret.len(),
        "loaded dataset"
    );
    Ok(ret)
}
