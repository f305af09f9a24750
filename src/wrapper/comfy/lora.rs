//! LoRA 加载
//! 依赖:
//! - python: comfy.utils, comfy.sd

use std::path::Path;

use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods, PyModule},
    Bound, Py, PyAny, PyResult, Python,
};

/// 读取 LoRA 权重
///
/// ```python,ignore
/// import comfy.utils
/// lora = comfy.utils.load_torch_file(path, safe_load=True)
/// ```
pub fn load_torch_file(py: Python<'_>, path: &Path) -> PyResult<Py<PyAny>> {
    let utils = PyModule::import(py, "comfy.utils")?;

    let kwargs = PyDict::new(py);
    kwargs.set_item("safe_load", true)?;

    let lora = utils.call_method(
        "load_torch_file",
        (path.to_string_lossy().to_string(),),
        Some(&kwargs),
    )?;
    Ok(lora.unbind())
}

/// 将 LoRA 应用到模型和 CLIP
///
/// ```python,ignore
/// import comfy.sd
/// model_lora, clip_lora = comfy.sd.load_lora_for_models(model, clip, lora, strength, strength)
/// ```
pub fn load_lora_for_models<'py>(
    py: Python<'py>,
    model: &Bound<'py, PyAny>,
    clip: &Bound<'py, PyAny>,
    lora: &Bound<'py, PyAny>,
    strength_model: f32,
    strength_clip: f32,
) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
    let sd = PyModule::import(py, "comfy.sd")?;

    let result = sd.call_method1(
        "load_lora_for_models",
        (model, clip, lora, strength_model, strength_clip),
    )?;

    result.extract::<(Bound<'py, PyAny>, Bound<'py, PyAny>)>()
}
