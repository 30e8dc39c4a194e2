//! Inference session adapter - owns one loaded model and turns
//! (observation, mask) pairs into action indices.
//!
//! The backend is reached only through two narrow traits:
//! - [`ModelStore`] opens a model location into a [`RawSession`]
//! - [`RawSession`] exposes tensor allocation, one forward pass, and release
//!
//! ```text
//! PolicyInput ──encode──▶ state tensor ─┐
//! ActionMask  ──encode──▶ mask tensor  ─┼─▶ run_once ─▶ output tensor ──decode──▶ action index
//! true        ─────────▶ det. tensor  ─┘
//! ```
//!
//! Every tensor created for a call is held by a [`TensorGuard`] and released
//! when the guard goes out of scope, on success and on every error path. The
//! session itself lives until [`InferenceSession::close`] (or drop).

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::action_space::{ActionMask, NUM_ACTIONS};
use super::policy::PolicyInput;

/// Handle to a backend-owned tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub u64);

/// Host-side tensor contents exchanged with the backend
#[derive(Debug, Clone, PartialEq)]
pub enum HostTensor {
    F32 { shape: Vec<usize>, data: Vec<f32> },
    Bool { shape: Vec<usize>, data: Vec<bool> },
    I64 { shape: Vec<usize>, data: Vec<i64> },
}

impl HostTensor {
    pub fn scalar_bool(value: bool) -> Self {
        HostTensor::Bool {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            HostTensor::F32 { shape, .. }
            | HostTensor::Bool { shape, .. }
            | HostTensor::I64 { shape, .. } => shape,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostTensor::F32 { data, .. } => data.len(),
            HostTensor::Bool { data, .. } => data.len(),
            HostTensor::I64 { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype(&self) -> &'static str {
        match self {
            HostTensor::F32 { .. } => "f32",
            HostTensor::Bool { .. } => "bool",
            HostTensor::I64 { .. } => "i64",
        }
    }
}

/// Failure reported by a raw backend primitive
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no model found at '{0}'")]
    NotFound(String),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("unknown slot '{0}'")]
    UnknownSlot(String),
    #[error("unknown tensor {0:?}")]
    UnknownTensor(TensorId),
    #[error("forward pass failed: {0}")]
    Run(String),
    #[error("forward pass timed out after {0:?}")]
    Timeout(Duration),
}

/// Named slots and shapes a model declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSignature {
    pub state_slot: String,
    pub mask_slot: String,
    pub deterministic_slot: String,
    pub output_slot: String,
    /// Width of the observation vector
    pub state_width: usize,
    pub num_actions: usize,
}

impl Default for ModelSignature {
    fn default() -> Self {
        Self {
            state_slot: "serving_default_args_0".to_string(),
            mask_slot: "serving_default_mask".to_string(),
            deterministic_slot: "serving_default_deterministic".to_string(),
            output_slot: "StatefulPartitionedCall".to_string(),
            state_width: 2,
            num_actions: NUM_ACTIONS,
        }
    }
}

/// Opens model locations into runnable sessions
pub trait ModelStore {
    type Session: RawSession;

    fn open(&self, location: &str) -> Result<Self::Session, BackendError>;
}

/// Raw primitives of a loaded model. Not required to be safe for concurrent
/// use; [`InferenceSession`] serializes every call.
pub trait RawSession: Send {
    fn signature(&self) -> &ModelSignature;

    fn create_tensor(&self, tensor: HostTensor) -> Result<TensorId, BackendError>;

    fn read_tensor(&self, id: TensorId) -> Result<HostTensor, BackendError>;

    fn release_tensor(&self, id: TensorId);

    /// One forward pass with `feeds` bound to named input slots, returning a
    /// newly allocated tensor for the `fetch` slot.
    fn run_once(&self, feeds: &[(&str, TensorId)], fetch: &str) -> Result<TensorId, BackendError>;

    /// Release the loaded model. Called exactly once.
    fn release(self);
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load model from '{location}': {reason}")]
    ModelLoad { location: String, reason: String },
    #[error("cannot encode policy input: {0}")]
    Encoding(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("inference session is closed")]
    ClosedSession,
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Inference(err.to_string())
    }
}

/// Transient tensor, released when dropped
struct TensorGuard<'s, S: RawSession> {
    session: &'s S,
    id: TensorId,
}

impl<'s, S: RawSession> TensorGuard<'s, S> {
    fn create(session: &'s S, tensor: HostTensor) -> Result<Self, SessionError> {
        let id = session.create_tensor(tensor)?;
        Ok(Self { session, id })
    }

    /// Take ownership of a tensor the backend allocated for us
    fn adopt(session: &'s S, id: TensorId) -> Self {
        Self { session, id }
    }
}

impl<S: RawSession> Drop for TensorGuard<'_, S> {
    fn drop(&mut self) {
        self.session.release_tensor(self.id);
    }
}

/// A loaded model, opened once and reused for every decision
pub struct InferenceSession<S: RawSession> {
    location: String,
    inner: Mutex<Option<S>>,
}

impl<S: RawSession> InferenceSession<S> {
    pub fn open<M>(store: &M, location: &str) -> Result<Self, SessionError>
    where
        M: ModelStore<Session = S>,
    {
        let load_error = |reason: String| SessionError::ModelLoad {
            location: location.to_string(),
            reason,
        };

        let session = store.open(location).map_err(|e| load_error(e.to_string()))?;

        let signature = session.signature();
        if signature.num_actions != NUM_ACTIONS {
            let reason = format!(
                "model declares {} actions, expected {}",
                signature.num_actions, NUM_ACTIONS
            );
            session.release();
            return Err(load_error(reason));
        }
        if signature.state_width == 0 {
            session.release();
            return Err(load_error("model declares an empty state input".to_string()));
        }

        info!("Opened inference session for {}", location);
        Ok(Self {
            location: location.to_string(),
            inner: Mutex::new(Some(session)),
        })
    }

    pub fn is_open(&self) -> bool {
        match self.inner.lock() {
            Ok(inner) => inner.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        }
    }

    /// Run one deterministic forward pass. Calls from several threads are
    /// serialized on the session lock.
    pub fn run(&self, input: &PolicyInput, mask: &ActionMask) -> Result<usize, SessionError> {
        // A panic mid-call has already released its tensors through the guards
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => {
                warn!("recovering session lock for {} after a panicked call", self.location);
                self.inner.clear_poison();
                poisoned.into_inner()
            }
        };
        let session = inner.as_ref().ok_or(SessionError::ClosedSession)?;

        let action = forward(session, input, mask)?;
        debug!("model at {} chose action {}", self.location, action);
        Ok(action)
    }

    /// Release the session. A second call fails with `ClosedSession`.
    pub fn close(&self) -> Result<(), SessionError> {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let session = inner.take().ok_or(SessionError::ClosedSession)?;
        session.release();
        info!("Closed inference session for {}", self.location);
        Ok(())
    }
}

impl<S: RawSession> Drop for InferenceSession<S> {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(session) = inner.take() {
            debug!("Releasing inference session for {} on drop", self.location);
            session.release();
        }
    }
}

impl<S: RawSession> fmt::Debug for InferenceSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceSession")
            .field("location", &self.location)
            .field("open", &self.is_open())
            .finish()
    }
}

fn forward<S: RawSession>(
    session: &S,
    input: &PolicyInput,
    mask: &ActionMask,
) -> Result<usize, SessionError> {
    let signature = session.signature();

    // Encode before allocating anything so a bad input costs nothing
    let state = encode_state(input, signature.state_width)?;

    let state = TensorGuard::create(session, state)?;
    let mask = TensorGuard::create(session, encode_mask(mask))?;
    let deterministic = TensorGuard::create(session, HostTensor::scalar_bool(true))?;

    let feeds = [
        (signature.state_slot.as_str(), state.id),
        (signature.mask_slot.as_str(), mask.id),
        (signature.deterministic_slot.as_str(), deterministic.id),
    ];
    let output = session
        .run_once(&feeds, &signature.output_slot)
        .map_err(|e| {
            warn!("forward pass failed: {}", e);
            SessionError::from(e)
        })?;
    let output = TensorGuard::adopt(session, output);

    let value = session.read_tensor(output.id)?;
    decode_action(&value, signature.num_actions)
}

/// Observation as a `[1, width]` float tensor
pub fn encode_state(input: &PolicyInput, width: usize) -> Result<HostTensor, SessionError> {
    let data = match input {
        PolicyInput::Absent => {
            return Err(SessionError::Encoding(
                "model requires an observation, none was given".to_string(),
            ));
        }
        PolicyInput::Position(position) => vec![position.x, position.y],
        PolicyInput::Features(features) => features.clone(),
    };

    if data.len() != width {
        return Err(SessionError::Encoding(format!(
            "model expects {} state values, got {}",
            width,
            data.len()
        )));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(SessionError::Encoding("state contains non-finite values".to_string()));
    }

    Ok(HostTensor::F32 {
        shape: vec![1, width],
        data,
    })
}

/// Mask as a `[1, NUM_ACTIONS]` boolean tensor
pub fn encode_mask(mask: &ActionMask) -> HostTensor {
    HostTensor::Bool {
        shape: vec![1, mask.len()],
        data: mask.as_slice().to_vec(),
    }
}

/// Single integer output to an action index
pub fn decode_action(output: &HostTensor, num_actions: usize) -> Result<usize, SessionError> {
    match output {
        HostTensor::I64 { data, .. } if data.len() == 1 => {
            let action = data[0];
            if action < 0 || action as usize >= num_actions {
                return Err(SessionError::Inference(format!(
                    "model returned action {} outside 0..{}",
                    action, num_actions
                )));
            }
            Ok(action as usize)
        }
        other => Err(SessionError::Inference(format!(
            "unexpected output: {} tensor of shape {:?}",
            other.dtype(),
            other.shape()
        ))),
    }
}
