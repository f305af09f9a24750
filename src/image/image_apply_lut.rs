//! LUT 调色滤镜
//!
//! LUT 文件位于 `<models>/luts`, 首次列出时从模型仓库下载预设

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use log::{debug, error, info, warn};
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::{
        category::CATEGORY_IMAGE,
        hub::HubFetcher,
        lut::{apply_lut, CubeLut, LutOptions},
        utils::directory::scan_files,
    },
    error::Error,
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::types::{NODE_BOOLEAN, NODE_FLOAT, NODE_IMAGE},
        torch::tensor::TensorWrapper,
    },
};

pub const LUT_FOLDER: &str = "luts";
const LUT_REPO: &str = "datasets/liguanwei/luts/resolve/main";
const LUT_PRESETS: [&str; 3] = ["快速电影.cube", "时尚电影.cube", "胶片颗粒质感电影.cube"];

/// LUT 调色滤镜
#[pyclass(subclass)]
pub struct ImageApplyLut {
    device: Device,
}

#[pymethods]
impl ImageApplyLut {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_IMAGE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("image",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Apply a .cube color lookup table to images."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let lut_dir = FolderPaths::resolve(py).model_folder(LUT_FOLDER);
            download_presets(&lut_dir);
            let lut_files = list_lut_files(&lut_dir);

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("image", (NODE_IMAGE,))?;
                required.set_item("lut_file", (lut_files,))?;
                required.set_item(
                    "gamma_correction",
                    (NODE_BOOLEAN, {
                        let gamma_correction = PyDict::new(py);
                        gamma_correction.set_item("default", true)?;
                        gamma_correction
                    }),
                )?;
                required.set_item(
                    "clip_values",
                    (NODE_BOOLEAN, {
                        let clip_values = PyDict::new(py);
                        clip_values.set_item("default", true)?;
                        clip_values.set_item("tooltip", "Clamp table values into the LUT domain")?;
                        clip_values
                    }),
                )?;
                required.set_item(
                    "strength",
                    (NODE_FLOAT, {
                        let strength = PyDict::new(py);
                        strength.set_item("default", 1.0)?;
                        strength.set_item("min", 0.0)?;
                        strength.set_item("max", 1.0)?;
                        strength.set_item("step", 0.01)?;
                        strength.set_item("display", "slider")?;
                        strength
                    }),
                )?;
                required
            })?;

            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        image: Bound<'py, PyAny>,
        lut_file: String,
        gamma_correction: bool,
        clip_values: bool,
        strength: f32,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let lut_path = FolderPaths::resolve(py)
            .model_folder(LUT_FOLDER)
            .join(&lut_file);
        let options = LutOptions {
            gamma_correction,
            strength: strength.min(1.0),
        };

        match self.apply(py, &image, &lut_path, clip_values, &options) {
            Ok(v) => Ok((v,)),
            Err(e) => {
                // 失败时原样返回输入图片
                error!("ImageApplyLut error, {e}");
                Ok((image,))
            }
        }
    }
}

impl ImageApplyLut {
    fn apply<'py>(
        &self,
        py: Python<'py>,
        image: &Bound<'py, PyAny>,
        lut_path: &Path,
        clip_values: bool,
        options: &LutOptions,
    ) -> Result<Bound<'py, PyAny>, Error> {
        info!("loading lut {}", lut_path.display());
        let mut lut = CubeLut::from_file(lut_path)?;
        if clip_values {
            lut.clip_to_domain();
        }

        let tensor = TensorWrapper::<f32>::new(image, &self.device)?.into_tensor();
        let output = apply_lut_to_tensor(&lut, &tensor, options)?;

        let py_tensor = TensorWrapper::<f32>::from_tensor(output).to_py_tensor(py)?;
        let device = image.getattr("device")?;
        Ok(py_tensor.call_method1("to", (device,))?)
    }
}

/// 对 `[B, H, W, 3]` 的图片张量应用 LUT
pub fn apply_lut_to_tensor(
    lut: &CubeLut,
    tensor: &Tensor,
    options: &LutOptions,
) -> Result<Tensor, Error> {
    let (batch, height, width, channels) = tensor.dims4()?;
    if channels != 3 {
        return Err(Error::InvalidTensorShape(format!(
            "expected 3 channels, got {channels}"
        )));
    }

    let mut pixels = tensor.flatten_all()?.to_vec1::<f32>()?;
    apply_lut(lut, &mut pixels, options)?;

    let output = Tensor::from_vec(pixels, (batch, height, width, channels), tensor.device())?;
    Ok(output)
}

/// 下载缺失的预设 LUT, 失败只记录日志
fn download_presets(lut_dir: &Path) {
    let fetcher = match HubFetcher::new() {
        Ok(v) => v,
        Err(e) => {
            warn!("create hub fetcher failed, {e}");
            return;
        }
    };

    for name in LUT_PRESETS {
        let dest = lut_dir.join(name);
        if dest.exists() {
            continue;
        }
        if let Err(e) = fetcher.fetch(&format!("{LUT_REPO}/{name}"), &dest) {
            warn!("download lut preset {name} failed, {e}");
        }
    }
}

/// 列出目录下的 .cube 文件名, 按名称排序
fn list_lut_files(lut_dir: &Path) -> Vec<String> {
    let files: Vec<PathBuf> = match scan_files(lut_dir, &["cube"], false) {
        Ok(v) => v,
        Err(e) => {
            warn!("list lut files failed, {e}");
            return Vec::new();
        }
    };

    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();
    debug!("available luts: {names:?}");
    names
}
