//! 视频相关的节点
//!
//! 依赖系统中的 ffmpeg
use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod ffmpeg;

mod folder_video_picker;
pub use folder_video_picker::FolderVideoPicker;

mod video_frame_extractor;
pub use video_frame_extractor::VideoFrameExtractor;

mod video_first_frame;
pub use video_first_frame::{save_frame, FrameFormat, VideoFirstFrame};

mod video_trim;
pub use video_trim::{normalize_output_path, parse_timestamp, VideoTrim};

mod frames_to_video;
pub use frames_to_video::{FramesToVideo, VideoFormat};

/// 视频模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "video")?;
    submodule.add_class::<FolderVideoPicker>()?;
    submodule.add_class::<VideoFrameExtractor>()?;
    submodule.add_class::<VideoFirstFrame>()?;
    submodule.add_class::<VideoTrim>()?;
    submodule.add_class::<FramesToVideo>()?;
    Ok(submodule)
}

/// Video node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "FolderVideoPicker",
            py.get_type::<FolderVideoPicker>(),
            "Ck Folder Video Picker",
        ),
        NodeRegister(
            "VideoFrameExtractor",
            py.get_type::<VideoFrameExtractor>(),
            "Ck Video Frame Extractor",
        ),
        NodeRegister(
            "VideoFirstFrame",
            py.get_type::<VideoFirstFrame>(),
            "Ck Video First Frame",
        ),
        NodeRegister("VideoTrim", py.get_type::<VideoTrim>(), "Ck Video Trim"),
        NodeRegister(
            "FramesToVideo",
            py.get_type::<FramesToVideo>(),
            "Ck Frames To Video",
        ),
    ];
    Ok(nodes)
}
