use std::path::{Path, PathBuf};

use log::{info, warn};
use machine_learning::{
    Device,
    arch::{Precision, Sequential},
};
use ndarray::{Array2, ArrayView2};

use crate::error::{Result, ValError};

/// Anything that maps a batch of inputs to raw predictions.
pub trait Predictor {
    /// Runs the model on one batch.
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>>;

    /// Switches to evaluation behaviour, disabling dropout and the like.
    fn eval(&mut self);

    fn set_precision(&mut self, precision: Precision);

    /// Width of the prediction rows, when the model knows it.
    fn output_dim(&self) -> Option<usize> {
        None
    }
}

impl Predictor for Sequential {
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        Sequential::forward(self, img)
    }

    fn eval(&mut self) {
        Sequential::eval(self);
    }

    fn set_precision(&mut self, precision: Precision) {
        match precision {
            Precision::Full => self.float(),
            Precision::Half => self.half(),
        }
    }

    fn output_dim(&self) -> Option<usize> {
        Some(Sequential::output_dim(self))
    }
}

/// Which artifact formats a backend was loaded from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Formats {
    /// The crate's own model format.
    pub native: bool,
    /// A scripted export of a native model.
    pub scripted: bool,
    /// A compiled engine with a fixed batch size.
    pub engine: bool,
}

/// A model loaded for standalone evaluation.
pub trait Backend: Predictor {
    /// The input size granularity of the model.
    fn stride(&self) -> usize;

    fn formats(&self) -> Formats;

    /// The device the model actually runs on.
    fn device(&self) -> Device;

    /// The fixed batch size of an engine backend.
    fn batch_size(&self) -> Option<usize> {
        None
    }
}

impl Predictor for Box<dyn Backend> {
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        (**self).forward(img)
    }

    fn eval(&mut self) {
        (**self).eval();
    }

    fn set_precision(&mut self, precision: Precision) {
        (**self).set_precision(precision);
    }

    fn output_dim(&self) -> Option<usize> {
        (**self).output_dim()
    }
}

/// Where a standalone run gets its model from.
#[derive(Debug)]
pub enum ModelSource {
    Path(PathBuf),
    Model(Sequential),
}

impl From<PathBuf> for ModelSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for ModelSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<&str> for ModelSource {
    fn from(value: &str) -> Self {
        Self::Path(PathBuf::from(value))
    }
}

impl From<Sequential> for ModelSource {
    fn from(value: Sequential) -> Self {
        Self::Model(value)
    }
}

/// Options a backend is loaded with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendOptions {
    pub device: Device,
    /// Prefer the DNN runtime for exchange formats.
    pub dnn: bool,
    /// Run in half precision, already downgraded for devices without support.
    pub half: bool,
}

/// Turns a model source into a loaded backend.
pub trait BackendLoader {
    fn load(&self, source: ModelSource, opts: &BackendOptions) -> Result<Box<dyn Backend>>;
}

/// The default loader. Native JSON artifacts and in-memory models are supported, other known
/// export formats are recognised and rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoBackend;

impl AutoBackend {
    fn load_path(path: &Path, opts: &BackendOptions) -> Result<Sequential> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Sequential::load(path).map_err(|e| {
                ValError::Backend(format!("failed to load '{}': {e}", path.display()))
            }),
            "torchscript" => Err(ValError::Backend(
                "scripted models need a scripting runtime, none is available".into(),
            )),
            "engine" => Err(ValError::Backend(
                "compiled engines need an engine runtime, none is available".into(),
            )),
            "onnx" if opts.dnn => Err(ValError::Backend(
                "the dnn runtime is not available for onnx models".into(),
            )),
            "onnx" => Err(ValError::Backend(
                "onnx models need an onnx runtime, none is available".into(),
            )),
            _ => Err(ValError::Backend(format!(
                "'{}' is not a recognised model format",
                path.display()
            ))),
        }
    }
}

impl BackendLoader for AutoBackend {
    fn load(&self, source: ModelSource, opts: &BackendOptions) -> Result<Box<dyn Backend>> {
        let mut model = match source {
            ModelSource::Path(path) => Self::load_path(&path, opts)?,
            ModelSource::Model(model) => model,
        };

        model.set_precision(Precision::from_half(opts.half));
        info!(
            "loaded native model with {} parameters on {}",
            model.size(),
            opts.device
        );

        Ok(Box::new(NativeBackend {
            model,
            device: opts.device,
        }))
    }
}

/// A `Sequential` model run in process.
#[derive(Debug)]
pub struct NativeBackend {
    model: Sequential,
    device: Device,
}

impl NativeBackend {
    pub fn new(model: Sequential, device: Device) -> Self {
        Self { model, device }
    }

    pub fn model(&self) -> &Sequential {
        &self.model
    }
}

impl Predictor for NativeBackend {
    fn forward(&mut self, img: ArrayView2<f32>) -> machine_learning::Result<Array2<f32>> {
        self.model.forward(img)
    }

    fn eval(&mut self) {
        self.model.eval();
    }

    fn set_precision(&mut self, precision: Precision) {
        Predictor::set_precision(&mut self.model, precision);
    }

    fn output_dim(&self) -> Option<usize> {
        Some(self.model.output_dim())
    }
}

impl Backend for NativeBackend {
    fn stride(&self) -> usize {
        self.model.stride()
    }

    fn formats(&self) -> Formats {
        Formats {
            native: true,
            ..Formats::default()
        }
    }

    fn device(&self) -> Device {
        self.device
    }
}

/// Rounds `imgsz` up to the nearest multiple of `stride`, warning when it changes.
pub fn check_imgsz(imgsz: usize, stride: usize) -> usize {
    let stride = stride.max(1);
    let checked = imgsz.max(1).div_ceil(stride) * stride;

    if checked != imgsz {
        warn!("imgsz={imgsz} must be a multiple of max stride {stride}, updating to {checked}");
    }

    checked
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{ActFnSpec, ModelSpec};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn model() -> Sequential {
        let spec = ModelSpec::mlp(&[3, 4, 2], ActFnSpec::Relu);
        Sequential::init(&spec, &mut StdRng::seed_from_u64(3)).unwrap()
    }

    #[test]
    fn imgsz_is_rounded_up_to_stride() {
        assert_eq!(check_imgsz(640, 32), 640);
        assert_eq!(check_imgsz(630, 32), 640);
        assert_eq!(check_imgsz(1, 32), 32);
    }

    #[test]
    fn in_memory_models_are_native() {
        let backend = AutoBackend
            .load(model().into(), &BackendOptions::default())
            .unwrap();

        assert!(backend.formats().native);
        assert!(!backend.formats().engine);
        assert_eq!(backend.stride(), 32);
        assert_eq!(backend.output_dim(), Some(2));
    }

    #[test]
    fn artifacts_load_from_json() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.json");
        model().save(&path).unwrap();

        let opts = BackendOptions {
            device: Device::Cuda(0),
            half: true,
            ..BackendOptions::default()
        };
        let backend = AutoBackend.load(path.into(), &opts).unwrap();
        assert_eq!(backend.device(), Device::Cuda(0));
    }

    #[test]
    fn foreign_formats_are_backend_errors() {
        for name in ["m.torchscript", "m.engine", "m.onnx", "m.bin", "missing.json"] {
            let res = AutoBackend.load(name.into(), &BackendOptions::default());
            assert!(matches!(res, Err(ValError::Backend(_))), "{name}");
        }
    }
}
