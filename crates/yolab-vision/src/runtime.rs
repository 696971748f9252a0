//! Seam to the inference runtime. The engine only needs a session that maps a
//! half precision input tensor to a half precision output tensor.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Gpu,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cpu => f.write_str("cpu"),
            Backend::Gpu => f.write_str("gpu"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// GPU when the loader reports one, else CPU.
    #[default]
    Auto,
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphOptimization {
    Disabled,
    Basic,
    Extended,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub backend: BackendPreference,
    pub graph_optimization: GraphOptimization,
    pub memory_arena: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            graph_optimization: GraphOptimization::All,
            memory_arena: true,
        }
    }
}

/// Returns the backend to load on and whether the preference had to be downgraded.
pub fn select_backend(pref: BackendPreference, available: &[Backend]) -> (Backend, bool) {
    let has_gpu = available.contains(&Backend::Gpu);
    match pref {
        BackendPreference::Auto => (if has_gpu { Backend::Gpu } else { Backend::Cpu }, false),
        BackendPreference::Cpu => (Backend::Cpu, false),
        BackendPreference::Gpu if has_gpu => (Backend::Gpu, false),
        BackendPreference::Gpu => (Backend::Cpu, true),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HalfTensor {
    pub shape: Vec<usize>,
    /// binary16 bit patterns, row-major.
    pub data: Vec<u16>,
}

impl HalfTensor {
    pub fn new(shape: Vec<usize>, data: Vec<u16>) -> Self {
        Self { shape, data }
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

#[async_trait]
pub trait InferenceSession: Send {
    fn input_name(&self) -> &str;
    fn output_name(&self) -> &str;
    async fn run(&mut self, input: HalfTensor) -> Result<HalfTensor, BoxError>;
}

#[async_trait]
pub trait ModelLoader: Send + Sync {
    fn available_backends(&self) -> Vec<Backend>;
    async fn load(
        &self,
        model_path: &Path,
        backend: Backend,
        options: &RuntimeOptions,
    ) -> Result<Box<dyn InferenceSession>, BoxError>;
}
