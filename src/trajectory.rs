//! Trajectory data model.
use super::{cfg, Error, Result};
use std::convert::{TryFrom, TryInto};
use tch::{Device, Kind, Tensor};

/// Positions laid out as (time steps x pedestrians x coordinates).
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    /// Number of time steps.
    steps: usize,

    /// Number of pedestrians, in a fixed order.
    peds: usize,

    /// Row major coordinates.
    data: Vec<f32>,
}

impl Trajectory {
    /// Wraps flat coordinates, checking they fill the shape.
    pub fn new(steps: usize, peds: usize, data: Vec<f32>) -> Result<Self> {
        let expected = steps * peds * cfg::COORDS;
        if data.len() != expected {
            return Err(Error::Shape {
                expected,
                found: data.len(),
            });
        }
        Ok(Self { steps, peds, data })
    }

    /// All pedestrians at the origin for every step.
    pub fn zeros(steps: usize, peds: usize) -> Self {
        let data = vec![Default::default(); steps * peds * cfg::COORDS];
        Self { steps, peds, data }
    }

    /// Stacks per pedestrian tracks, each holding `steps` positions.
    pub fn from_tracks(steps: usize, tracks: &[Vec<[f32; 2]>]) -> Result<Self> {
        let mut data = Vec::with_capacity(steps * tracks.len() * cfg::COORDS);
        for step in 0..steps {
            for track in tracks {
                let position = track.get(step).ok_or(Error::Shape {
                    expected: steps,
                    found: track.len(),
                })?;
                data.extend_from_slice(position);
            }
        }
        Self::new(steps, tracks.len(), data)
    }

    /// Copies a (steps x peds x 2) tensor back to the host.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let (steps, peds, _) = tensor.size3()?;
        let data = Vec::<f32>::try_from(
            tensor
                .f_detach()?
                .f_to_kind(Kind::Float)?
                .f_to_device(Device::Cpu)?
                .f_flatten(0, -1)?,
        )?;
        Self::new(steps.try_into()?, peds.try_into()?, data)
    }

    /// Moves the positions to the given device as a (steps x peds x 2) tensor.
    pub fn to_tensor(&self, device: Device) -> Result<Tensor> {
        let size = [
            i64::try_from(self.steps)?,
            i64::try_from(self.peds)?,
            i64::try_from(cfg::COORDS)?,
        ];
        Ok(Tensor::from_slice(&self.data)
            .f_to_device(device)?
            .f_view(size)?)
    }

    /// Number of time steps.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of pedestrians.
    pub fn peds(&self) -> usize {
        self.peds
    }

    /// Position of one pedestrian at one step.
    pub fn position(&self, step: usize, ped: usize) -> [f32; 2] {
        let i = (step * self.peds + ped) * cfg::COORDS;
        [self.data[i], self.data[i + 1]]
    }

    /// Mutable position of one pedestrian at one step.
    #[cfg(test)]
    pub fn position_mut(&mut self, step: usize, ped: usize) -> &mut [f32] {
        let i = (step * self.peds + ped) * cfg::COORDS;
        &mut self.data[i..i + cfg::COORDS]
    }

    /// Positions of every pedestrian at one step.
    pub fn step(&self, step: usize) -> impl Iterator<Item = [f32; 2]> + '_ {
        (0..self.peds).map(move |ped| self.position(step, ped))
    }
}

/// Observed segment with the target segment which follows it.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Positions fed to the predictor.
    observed: Trajectory,

    /// Ground truth for the prediction horizon.
    target: Trajectory,
}

impl Batch {
    /// Pairs the segments, which must list the same pedestrians in the same order.
    pub fn new(observed: Trajectory, target: Trajectory) -> Result<Self> {
        if observed.peds != target.peds {
            return Err(Error::Misaligned {
                observed: observed.peds,
                target: target.peds,
            });
        }
        Ok(Self { observed, target })
    }

    /// Positions fed to the predictor.
    pub fn observed(&self) -> &Trajectory {
        &self.observed
    }

    /// Ground truth for the prediction horizon.
    pub fn target(&self) -> &Trajectory {
        &self.target
    }

    /// Number of pedestrians in this batch.
    pub fn peds(&self) -> usize {
        self.observed.peds
    }
}
