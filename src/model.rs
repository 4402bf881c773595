//! Recurrent trajectory predictor.
use super::{cfg, Error, Result};
use std::convert::TryFrom;
use tch::{
    nn,
    nn::{Module, RNN},
    Device, Kind, Tensor,
};

/// A library recurrent layer driven one step at a time.
pub trait Cell: RNN {
    /// Registers the layer's variables under the given path.
    fn build(path: &nn::Path, input: i64, hidden: i64) -> Self;

    /// Top layer hidden state, (pedestrians x hidden).
    fn hidden(state: &Self::State) -> Tensor;
}

/// Shared settings for both cell kinds.
fn rnn_config() -> nn::RNNConfig {
    nn::RNNConfig {
        num_layers: cfg::LAYERS as i64,
        batch_first: true,
        ..Default::default()
    }
}

impl Cell for nn::GRU {
    fn build(path: &nn::Path, input: i64, hidden: i64) -> Self {
        nn::gru(path, input, hidden, rnn_config())
    }

    fn hidden(state: &nn::GRUState) -> Tensor {
        state.value().select(0, -1)
    }
}

impl Cell for nn::LSTM {
    fn build(path: &nn::Path, input: i64, hidden: i64) -> Self {
        nn::lstm(path, input, hidden, rnn_config())
    }

    fn hidden(state: &nn::LSTMState) -> Tensor {
        state.h().select(0, -1)
    }
}

/// Embeds positions, advances a recurrent cell and projects back to positions.
pub struct Predictor<C: Cell> {
    /// Maps a position into the embedding space.
    embedding: nn::Linear,

    /// Recurrent state update.
    cell: C,

    /// Maps the hidden state back to a position.
    output: nn::Linear,

    /// Probability of zeroing an embedding unit while training.
    dropout: f64,

    /// Where the variables live.
    device: Device,
}

impl<C: Cell> Predictor<C> {
    /// Initializes the network variables under the given path.
    pub fn new(path: &nn::Path, model: &cfg::ModelCfg) -> Result<Self> {
        let input = i64::try_from(cfg::INPUT_SIZE)?;
        let output = i64::try_from(cfg::OUTPUT_SIZE)?;
        let embedding = nn::linear(
            path / "input_embedding",
            input,
            model.embedding_size,
            Default::default(),
        );
        let cell = C::build(&(path / "cell"), model.embedding_size, model.rnn_size);
        let output = nn::linear(path / "output", model.rnn_size, output, Default::default());
        Ok(Self {
            embedding,
            cell,
            output,
            dropout: model.dropout,
            device: path.device(),
        })
    }

    /// Device holding the variables.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Advances the state by one (pedestrians x 2) position and projects the result.
    pub fn step(
        &self,
        position: &Tensor,
        state: &C::State,
        train: bool,
    ) -> Result<(C::State, Tensor)> {
        let embedded = self
            .embedding
            .forward(position)
            .f_relu()?
            .f_dropout(self.dropout, train)?;
        let state = self.cell.step(&embedded, state);
        let out = self.output.forward(&C::hidden(&state));
        Ok((state, out))
    }

    /// Runs the observed window from a zero state.
    ///
    /// Returns the final state and the position projected from it, which seeds decoding.
    pub fn encode(&self, observed: &Tensor, train: bool) -> Result<(C::State, Tensor)> {
        let (steps, peds, coords) = observed.size3()?;
        let expected = usize::try_from(peds)? * cfg::COORDS;
        if coords != i64::try_from(cfg::COORDS)? {
            return Err(Error::Shape {
                expected,
                found: usize::try_from(peds * coords)?,
            });
        }
        let mut state = self.cell.zero_state(peds);
        let mut out = None;
        for t in 0..steps {
            let (next, o) = self.step(&observed.f_select(0, t)?, &state, train)?;
            state = next;
            out = Some(o);
        }
        Ok((state, out.ok_or(Error::EmptyObservation)?))
    }

    /// Feeds each output back in as the next input for `pred_len` steps.
    pub fn decode(
        &self,
        mut state: C::State,
        seed: Tensor,
        pred_len: usize,
        train: bool,
    ) -> Result<Tensor> {
        let (peds, _) = seed.size2()?;
        if pred_len == 0 {
            let size = [0, peds, i64::try_from(cfg::OUTPUT_SIZE)?];
            return Ok(Tensor::f_zeros(size, (Kind::Float, self.device))?);
        }
        let mut out = seed;
        let mut outputs = Vec::with_capacity(pred_len);
        for _ in 0..pred_len {
            let (next, o) = self.step(&out, &state, train)?;
            state = next;
            outputs.push(o.shallow_clone());
            out = o;
        }
        Ok(Tensor::f_stack(&outputs, 0)?)
    }

    /// Predicts (pred_len x pedestrians x 2) positions from (steps x pedestrians x 2).
    pub fn forward_t(&self, observed: &Tensor, pred_len: usize, train: bool) -> Result<Tensor> {
        let (state, seed) = self.encode(observed, train)?;
        self.decode(state, seed, pred_len, train)
    }
}

#[cfg(test)]
mod tests {
    use super::{Cell, Predictor};
    use crate::{cfg, trajectory::Trajectory, Error};
    use tch::{nn, Device, Kind, Tensor};

    fn model_cfg(cell: cfg::CellKind) -> cfg::ModelCfg {
        cfg::ModelCfg {
            cell,
            rnn_size: 16,
            embedding_size: 8,
            dropout: 0.5,
            neighborhood_size: 32,
            grid_size: 4,
            max_num_peds: 27,
        }
    }

    fn predictor<C: Cell>(vs: &nn::VarStore, cell: cfg::CellKind) -> Predictor<C> {
        Predictor::new(&vs.root(), &model_cfg(cell)).unwrap()
    }

    fn observed(steps: usize, peds: usize) -> Tensor {
        let data = (0..steps * peds * 2).map(|x| x as f32 / 10.0).collect();
        Trajectory::new(steps, peds, data)
            .unwrap()
            .to_tensor(Device::Cpu)
            .unwrap()
    }

    #[test]
    fn predicts_requested_horizon() {
        tch::manual_seed(0);
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let out = p.forward_t(&observed(8, 3), 12, true).unwrap();
        assert_eq!(out.size(), vec![12, 3, 2]);
    }

    #[test]
    fn lstm_predicts_requested_horizon() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::LSTM> = predictor(&vs, cfg::CellKind::Lstm);
        let out = p.forward_t(&observed(8, 3), 12, false).unwrap();
        assert_eq!(out.size(), vec![12, 3, 2]);
    }

    #[test]
    fn zero_horizon_is_empty() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let out = p.forward_t(&observed(8, 3), 0, false).unwrap();
        assert_eq!(out.size(), vec![0, 3, 2]);
        assert_eq!(out.numel(), 0);
    }

    #[test]
    fn single_pedestrian_keeps_its_axis() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let out = p.forward_t(&observed(8, 1), 4, false).unwrap();
        assert_eq!(out.size(), vec![4, 1, 2]);
    }

    #[test]
    fn decoding_starts_from_encoder_output() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let zeros = Trajectory::zeros(8, 3).to_tensor(Device::Cpu).unwrap();
        let (state, seed) = p.encode(&zeros, false).unwrap();
        let (_, expected) = p.step(&seed, &state, false).unwrap();
        let (state, seed) = p.encode(&zeros, false).unwrap();
        let first = p.decode(state, seed, 1, false).unwrap().select(0, 0);
        assert!(first.allclose(&expected, 0.0, 0.0, false));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let a = p.forward_t(&observed(5, 2), 3, false).unwrap();
        let b = p.forward_t(&observed(5, 2), 3, false).unwrap();
        assert!(a.allclose(&b, 0.0, 0.0, false));
    }

    #[test]
    fn empty_observation_is_rejected() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let empty = Tensor::zeros([0, 3, 2], (Kind::Float, Device::Cpu));
        match p.forward_t(&empty, 4, false) {
            Err(Error::EmptyObservation) => {}
            x => panic!("{:?}", x.map(|t| t.size())),
        }
    }

    #[test]
    fn wrong_width_is_rejected() {
        let vs = nn::VarStore::new(Device::Cpu);
        let p: Predictor<nn::GRU> = predictor(&vs, cfg::CellKind::Gru);
        let wide = Tensor::zeros([8, 3, 3], (Kind::Float, Device::Cpu));
        assert!(p.forward_t(&wide, 4, false).is_err());
        let flat = Tensor::zeros([8, 6], (Kind::Float, Device::Cpu));
        assert!(p.forward_t(&flat, 4, false).is_err());
    }
}
