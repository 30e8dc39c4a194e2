//! Burn-backed model store: a small MLP that maps a position to action logits
//!
//! A model location is a directory holding `config.json` ([`PolicyNetConfig`])
//! and `model.mpk` (weights written by `NamedMpkFileRecorder`).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;

use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::Distribution;

use super::action_space::NUM_ACTIONS;
use super::session::{BackendError, HostTensor, ModelSignature, ModelStore, RawSession, TensorId};

pub const CONFIG_FILE: &str = "config.json";
/// Recorder base name; the recorder adds the `.mpk` extension
pub const WEIGHTS_FILE: &str = "model";

/// Logit added to masked-out actions
const MASKED_LOGIT: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct PolicyNetConfig {
    /// Observation width
    #[config(default = 2)]
    pub state_width: usize,
    #[config(default = 64)]
    pub hidden_size: usize,
    /// Number of hidden layers
    #[config(default = 2)]
    pub num_layers: usize,
}

impl PolicyNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PolicyNet<B> {
        let input = LinearConfig::new(self.state_width, self.hidden_size).init(device);

        let mut hidden = Vec::new();
        for _ in 0..self.num_layers.saturating_sub(1) {
            hidden.push(LinearConfig::new(self.hidden_size, self.hidden_size).init(device));
        }

        let output = LinearConfig::new(self.hidden_size, NUM_ACTIONS).init(device);

        PolicyNet {
            input,
            hidden,
            output,
            activation: Relu::new(),
        }
    }
}

/// Movement policy network
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    input: Linear<B>,
    hidden: Vec<Linear<B>>,
    /// Logits for each action
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PolicyNet<B> {
    /// Forward pass returning raw logits
    pub fn forward(&self, state: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.input.forward(state));

        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }

        self.output.forward(x)
    }

    /// Pick an action per row. mask: 1.0 = valid, 0.0 = invalid
    pub fn select(
        &self,
        state: Tensor<B, 2>,
        mask: Tensor<B, 2>,
        deterministic: bool,
    ) -> Tensor<B, 2, Int> {
        let logits = self.forward(state);
        let blocked = (Tensor::ones_like(&mask) - mask.clone()) * MASKED_LOGIT;
        let masked_logits = logits * mask + blocked;

        if deterministic {
            return masked_logits.argmax(1);
        }

        // Gumbel-max sampling
        let uniform = Tensor::<B, 2>::random(
            masked_logits.shape(),
            Distribution::Uniform(1.0e-6, 1.0),
            &masked_logits.device(),
        );
        let gumbel = -(-uniform.log()).log();
        (masked_logits + gumbel).argmax(1)
    }

    /// Write config and weights into `dir`
    pub fn save(self, dir: &Path, config: &PolicyNetConfig) -> Result<(), BackendError> {
        std::fs::create_dir_all(dir).map_err(|e| BackendError::InvalidModel(e.to_string()))?;
        config
            .save(dir.join(CONFIG_FILE))
            .map_err(|e| BackendError::InvalidModel(e.to_string()))?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.save_file(dir.join(WEIGHTS_FILE), &recorder)
            .map_err(|e| BackendError::InvalidModel(format!("{e:?}")))
    }
}

/// Opens model directories on a burn device
pub struct BurnModelStore<B: Backend> {
    device: B::Device,
}

impl<B: Backend> BurnModelStore<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> ModelStore for BurnModelStore<B> {
    type Session = BurnSession<B>;

    fn open(&self, location: &str) -> Result<BurnSession<B>, BackendError> {
        let dir = Path::new(location);
        if !dir.is_dir() {
            return Err(BackendError::NotFound(location.to_string()));
        }

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.is_file() {
            return Err(BackendError::NotFound(config_path.display().to_string()));
        }
        let config = PolicyNetConfig::load(&config_path)
            .map_err(|e| BackendError::InvalidModel(format!("{e:?}")))?;

        let weights_path = dir.join(WEIGHTS_FILE);
        if !weights_path.with_extension("mpk").is_file() {
            return Err(BackendError::NotFound(format!("{}.mpk", weights_path.display())));
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<B>(&self.device)
            .load_file(weights_path, &recorder, &self.device)
            .map_err(|e| BackendError::InvalidModel(format!("{e:?}")))?;

        tracing::info!(
            "Loaded policy network from {} ({} hidden x {})",
            location,
            config.hidden_size,
            config.num_layers
        );

        Ok(BurnSession::new(model, &config, self.device.clone()))
    }
}

/// A loaded network plus the host tensors of the call in progress
pub struct BurnSession<B: Backend> {
    model: PolicyNet<B>,
    device: B::Device,
    signature: ModelSignature,
    tensors: RefCell<HashMap<TensorId, HostTensor>>,
    next_id: Cell<u64>,
}

impl<B: Backend> BurnSession<B> {
    pub fn new(model: PolicyNet<B>, config: &PolicyNetConfig, device: B::Device) -> Self {
        Self {
            model,
            device,
            signature: ModelSignature {
                state_width: config.state_width,
                ..ModelSignature::default()
            },
            tensors: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// Tensors currently alive in this session
    pub fn live_tensors(&self) -> usize {
        self.tensors.borrow().len()
    }

    fn feed(&self, feeds: &[(&str, TensorId)], slot: &str) -> Result<HostTensor, BackendError> {
        let (_, id) = feeds
            .iter()
            .find(|(name, _)| *name == slot)
            .ok_or_else(|| BackendError::UnknownSlot(slot.to_string()))?;
        self.read_tensor(*id)
    }
}

impl<B: Backend> RawSession for BurnSession<B> {
    fn signature(&self) -> &ModelSignature {
        &self.signature
    }

    fn create_tensor(&self, tensor: HostTensor) -> Result<TensorId, BackendError> {
        let id = TensorId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.tensors.borrow_mut().insert(id, tensor);
        Ok(id)
    }

    fn read_tensor(&self, id: TensorId) -> Result<HostTensor, BackendError> {
        self.tensors
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(BackendError::UnknownTensor(id))
    }

    fn release_tensor(&self, id: TensorId) {
        self.tensors.borrow_mut().remove(&id);
    }

    fn run_once(&self, feeds: &[(&str, TensorId)], fetch: &str) -> Result<TensorId, BackendError> {
        let signature = &self.signature;
        if fetch != signature.output_slot {
            return Err(BackendError::UnknownSlot(fetch.to_string()));
        }

        let width = signature.state_width;
        let state = match self.feed(feeds, &signature.state_slot)? {
            HostTensor::F32 { data, .. } if data.len() == width => data,
            other => {
                return Err(BackendError::Run(format!(
                    "state slot expects {} floats, got shape {:?}",
                    width,
                    other.shape()
                )));
            }
        };
        let mask: Vec<f32> = match self.feed(feeds, &signature.mask_slot)? {
            HostTensor::Bool { data, .. } if data.len() == NUM_ACTIONS => {
                data.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect()
            }
            other => {
                return Err(BackendError::Run(format!(
                    "mask slot expects {} booleans, got shape {:?}",
                    NUM_ACTIONS,
                    other.shape()
                )));
            }
        };
        let deterministic = match self.feed(feeds, &signature.deterministic_slot)? {
            HostTensor::Bool { data, .. } if data.len() == 1 => data[0],
            other => {
                return Err(BackendError::Run(format!(
                    "deterministic slot expects a boolean scalar, got shape {:?}",
                    other.shape()
                )));
            }
        };

        let state = Tensor::<B, 1>::from_floats(state.as_slice(), &self.device).reshape([1, width]);
        let mask =
            Tensor::<B, 1>::from_floats(mask.as_slice(), &self.device).reshape([1, NUM_ACTIONS]);

        let action = self.model.select(state, mask, deterministic);
        let data: Vec<i64> = action
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| BackendError::Run(format!("{e:?}")))?;

        self.create_tensor(HostTensor::I64 {
            shape: vec![1],
            data,
        })
    }

    fn release(self) {
        let leaked = self.live_tensors();
        if leaked > 0 {
            tracing::warn!("releasing session with {} live tensors", leaked);
        }
        tracing::debug!("policy network released");
    }
}
