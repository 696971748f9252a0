//! ONNX Runtime backend for the runtime seam.

use std::path::Path;

use async_trait::async_trait;
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, info};

use crate::runtime::{Backend, BoxError, GraphOptimization, HalfTensor, InferenceSession, ModelLoader, RuntimeOptions};

#[derive(Debug, Default, Clone, Copy)]
pub struct OrtLoader;

pub struct OrtSession {
    session: Session,
    input_name: String,
    output_name: String,
}

fn optimization_level(g: GraphOptimization) -> GraphOptimizationLevel {
    match g {
        GraphOptimization::Disabled => GraphOptimizationLevel::Disable,
        GraphOptimization::Basic => GraphOptimizationLevel::Level1,
        GraphOptimization::Extended => GraphOptimizationLevel::Level2,
        GraphOptimization::All => GraphOptimizationLevel::Level3,
    }
}

#[async_trait]
impl ModelLoader for OrtLoader {
    fn available_backends(&self) -> Vec<Backend> {
        let mut out = vec![Backend::Cpu];
        if CUDAExecutionProvider::default().is_available().unwrap_or(false) {
            out.push(Backend::Gpu);
        }
        out
    }

    async fn load(
        &self,
        model_path: &Path,
        backend: Backend,
        options: &RuntimeOptions,
    ) -> Result<Box<dyn InferenceSession>, BoxError> {
        let bytes = tokio::fs::read(model_path).await?;
        debug!("vision: model file {:.2} MB", bytes.len() as f64 / (1024.0 * 1024.0));

        let cpu = CPUExecutionProvider::default()
            .with_arena_allocator(options.memory_arena)
            .build();
        let providers = match backend {
            Backend::Gpu => vec![CUDAExecutionProvider::default().build(), cpu],
            Backend::Cpu => vec![cpu],
        };

        let session = Session::builder()?
            .with_optimization_level(optimization_level(options.graph_optimization))?
            .with_memory_pattern(options.memory_arena)?
            .with_execution_providers(providers)?
            .commit_from_memory(&bytes)?;

        let input_name = session.inputs.first().map(|i| i.name.clone()).ok_or("model declares no inputs")?;
        let output_name = session.outputs.first().map(|o| o.name.clone()).ok_or("model declares no outputs")?;
        info!("vision: onnx session input={} output={} backend={}", input_name, output_name, backend);

        Ok(Box::new(OrtSession { session, input_name, output_name }))
    }
}

#[async_trait]
impl InferenceSession for OrtSession {
    fn input_name(&self) -> &str {
        &self.input_name
    }

    fn output_name(&self) -> &str {
        &self.output_name
    }

    async fn run(&mut self, input: HalfTensor) -> Result<HalfTensor, BoxError> {
        let data: Vec<half::f16> = input.data.iter().map(|&b| half::f16::from_bits(b)).collect();
        let tensor = Tensor::from_array((input.shape, data))?;

        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => tensor])?;
        let (shape, values) = outputs[self.output_name.as_str()].try_extract_tensor::<half::f16>()?;

        let shape = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok(HalfTensor::new(shape, values.iter().map(|v| v.to_bits()).collect()))
    }
}
