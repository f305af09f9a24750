//! 图片相关的节点
use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod folder_image_picker;
pub use folder_image_picker::FolderImagePicker;

mod image_apply_lut;
pub use image_apply_lut::{apply_lut_to_tensor, ImageApplyLut};

/// 图片模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "image")?;
    submodule.add_class::<FolderImagePicker>()?;
    submodule.add_class::<ImageApplyLut>()?;
    Ok(submodule)
}

/// Image node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "FolderImagePicker",
            py.get_type::<FolderImagePicker>(),
            "Ck Folder Image Picker",
        ),
        NodeRegister(
            "ImageApplyLut",
            py.get_type::<ImageApplyLut>(),
            "Ck Image Apply LUT",
        ),
    ];
    Ok(nodes)
}
