pub mod core;
pub mod error;
pub mod wrapper;

pub mod douyin;
pub mod image;
pub mod model;
pub mod text;
pub mod video;

use pyo3::{
    pymodule,
    types::{PyDict, PyDictMethods, PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::{node::NodeRegister, utils::log::init_logger};

/// A Python module implemented in Rust.
#[pymodule]
#[pyo3(name = "comfyui_creator_kit")] // 需要与包名保持一致
fn py_init(py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    init_logger();

    // 添加子模块
    m.add_submodule(&douyin::submodule(py)?)?;
    m.add_submodule(&text::submodule(py)?)?;
    m.add_submodule(&image::submodule(py)?)?;
    m.add_submodule(&video::submodule(py)?)?;
    m.add_submodule(&model::submodule(py)?)?;

    // 注册 ComfyUI NODE_CLASS_MAPPINGS/NODE_DISPLAY_NAME_MAPPINGS
    let node_mapping = PyDict::new(py);
    let name_mapping = PyDict::new(py);

    let nodes = node_register(py)?;
    for node in nodes {
        node_mapping.set_item(node.0, node.1)?;
        name_mapping.set_item(node.0, node.2)?;
    }

    m.add("NODE_CLASS_MAPPINGS", node_mapping)?;
    m.add("NODE_DISPLAY_NAME_MAPPINGS", name_mapping)?;
    Ok(())
}

/// 节点注册
fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let mut nodes: Vec<NodeRegister> = Vec::new();
    nodes.extend(douyin::node_register(py)?);
    nodes.extend(text::node_register(py)?);
    nodes.extend(image::node_register(py)?);
    nodes.extend(video::node_register(py)?);
    nodes.extend(model::node_register(py)?);
    Ok(nodes)
}
