//! 图片序列转视频
//!
//! 优先使用 IMAGE 输入, 否则读取 frames_dir 中按模板命名的图片

use std::{
    fs,
    path::{Path, PathBuf},
};

use candle_core::Device;
use chrono::Local;
use log::{error, info, warn};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};
use strum_macros::{Display, EnumString};

use crate::{
    core::{
        category::CATEGORY_VIDEO,
        utils::{directory::scan_files, image::tensor_to_images},
    },
    error::Error,
    video::ffmpeg::{expand_time_placeholder, Ffmpeg},
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{
            types::{NODE_IMAGE, NODE_INT, NODE_STRING},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

pub const TEMP_FRAME_DIR: &str = "frame2video_temp";
pub const TEMP_FRAME_PATTERN: &str = "temp_frame_%06d.png";
const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// 输出视频格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mov,
}

impl VideoFormat {
    pub fn choices() -> Vec<String> {
        [VideoFormat::Mp4, VideoFormat::Avi, VideoFormat::Mov]
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    /// 编码参数
    pub fn codec(&self) -> &'static [&'static str] {
        match self {
            VideoFormat::Mp4 | VideoFormat::Mov => &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
            VideoFormat::Avi => &["-c:v", "mpeg4", "-q:v", "2"],
        }
    }
}

#[pyclass(subclass)]
pub struct FramesToVideo {
    device: Device,
}

impl PromptServer for FramesToVideo {}

#[pymethods]
impl FramesToVideo {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("video_path",)
    }

    #[classattr]
    #[pyo3(name = "OUTPUT_NODE")]
    const OUTPUT_NODE: bool = true;

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_VIDEO;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Encode an image sequence into a video with ffmpeg, optionally muxing an audio track."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "output_path",
                    (NODE_STRING, {
                        let output_path = PyDict::new(py);
                        output_path.set_item("default", "[time]/output.mp4")?;
                        output_path.set_item("tooltip", "Relative to the output directory")?;
                        output_path
                    }),
                )?;
                required.set_item(
                    "frame_rate",
                    (NODE_INT, {
                        let frame_rate = PyDict::new(py);
                        frame_rate.set_item("default", 30)?;
                        frame_rate.set_item("min", 1)?;
                        frame_rate.set_item("max", 120)?;
                        frame_rate
                    }),
                )?;
                required.set_item(
                    "video_format",
                    (VideoFormat::choices(), {
                        let video_format = PyDict::new(py);
                        video_format.set_item("default", VideoFormat::Mp4.to_string())?;
                        video_format
                    }),
                )?;
                required.set_item(
                    "filename_pattern",
                    (NODE_STRING, {
                        let filename_pattern = PyDict::new(py);
                        filename_pattern.set_item("default", "frame_%06d.png")?;
                        filename_pattern
                    }),
                )?;
                required
            })?;

            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "frames_dir",
                    (NODE_STRING, {
                        let frames_dir = PyDict::new(py);
                        frames_dir.set_item("default", "input/frames")?;
                        frames_dir.set_item("forceInput", true)?;
                        frames_dir
                    }),
                )?;
                optional.set_item(
                    "audio_path",
                    (NODE_STRING, {
                        let audio_path = PyDict::new(py);
                        audio_path.set_item("default", "")?;
                        audio_path.set_item("forceInput", true)?;
                        audio_path
                    }),
                )?;
                optional.set_item("images", (NODE_IMAGE,))?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(
        name = "execute",
        signature = (output_path, frame_rate, video_format, filename_pattern, frames_dir=String::new(), audio_path=String::new(), images=None)
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        output_path: String,
        frame_rate: u32,
        video_format: String,
        filename_pattern: String,
        frames_dir: String,
        audio_path: String,
        images: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(String,)> {
        let folder_paths = FolderPaths::resolve(py);
        let result = self
            .prepare_frames(folder_paths.temp_directory(), images.as_ref())
            .and_then(|staged| {
                let (frames_dir, pattern) = match staged {
                    Some(dir) => (dir, TEMP_FRAME_PATTERN.to_string()),
                    None => (PathBuf::from(frames_dir.trim()), filename_pattern),
                };
                self.encode(
                    folder_paths.output_directory(),
                    &output_path,
                    frame_rate,
                    &video_format,
                    &frames_dir,
                    &pattern,
                    &audio_path,
                )
            });

        match result {
            Ok(v) => Ok((v.to_string_lossy().to_string(),)),
            Err(e) => {
                error!("FramesToVideo error, {e}");
                if let Err(e) = self.send_error(py, "FramesToVideo".to_string(), e.to_string()) {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl FramesToVideo {
    /// 将 IMAGE 输入写入临时目录, 没有输入或输入为空时返回 None
    fn prepare_frames(
        &self,
        temp_directory: &Path,
        images: Option<&Bound<'_, PyAny>>,
    ) -> Result<Option<PathBuf>, Error> {
        let Some(images) = images else {
            return Ok(None);
        };
        let tensor = TensorWrapper::<f32>::new(images, &self.device)?.into_tensor();
        if tensor.elem_count() == 0 {
            return Ok(None);
        }

        let dir = temp_directory.join(TEMP_FRAME_DIR);
        save_temp_frames(&tensor, &dir)?;
        Ok(Some(dir))
    }

    #[allow(clippy::too_many_arguments)]
    fn encode(
        &self,
        output_directory: &Path,
        output_path: &str,
        frame_rate: u32,
        video_format: &str,
        frames_dir: &Path,
        pattern: &str,
        audio_path: &str,
    ) -> Result<PathBuf, Error> {
        let format = video_format
            .parse::<VideoFormat>()
            .map_err(|e| Error::ParseEnumString(e.to_string()))?;
        if !frames_dir.is_dir() {
            return Err(Error::InvalidDirectory(frames_dir.to_string_lossy().to_string()));
        }
        if scan_files(frames_dir, &FRAME_EXTENSIONS, false)?.is_empty() {
            return Err(Error::FileNotFound(format!(
                "no image files in {}",
                frames_dir.display()
            )));
        }

        let dest = output_file(
            output_directory,
            &expand_time_placeholder(output_path.trim(), &Local::now()),
            format,
        );
        let ffmpeg = Ffmpeg::locate()?;
        ffmpeg.encode_frames(frames_dir, pattern, frame_rate, format.codec(), &dest)?;
        info!("encoded {} to {}", frames_dir.display(), dest.display());

        let audio = Path::new(audio_path.trim());
        if !audio_path.trim().is_empty() && audio.is_file() {
            add_audio(&ffmpeg, &dest, audio);
        }
        Ok(dest)
    }
}

/// 输出文件扩展名与格式保持一致
fn output_file(output_directory: &Path, output_path: &str, format: VideoFormat) -> PathBuf {
    let path = match output_path {
        "" => PathBuf::from("output"),
        v => PathBuf::from(v),
    };
    output_directory
        .join(path)
        .with_extension(format.to_string())
}

/// 清空临时目录后写入 `temp_frame_%06d.png`
fn save_temp_frames(tensor: &candle_core::Tensor, dir: &Path) -> Result<usize, Error> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;

    let images = tensor_to_images(tensor)?;
    for (index, image) in images.iter().enumerate() {
        image.save(dir.join(format!("temp_frame_{index:06}.png")))?;
    }
    Ok(images.len())
}

/// 合并音轨后替换原视频, 失败时保留无声视频
fn add_audio(ffmpeg: &Ffmpeg, video: &Path, audio: &Path) {
    let stem = video
        .file_stem()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = video
        .extension()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    let muxed = video.with_file_name(format!("{stem}_with_audio.{extension}"));

    let result = ffmpeg
        .mux_audio(video, audio, &muxed)
        .and_then(|_| fs::rename(&muxed, video).map_err(Error::from));
    if let Err(e) = result {
        warn!("add audio failed, keep the silent video, {e}");
        if muxed.exists() {
            if let Err(e) = fs::remove_file(&muxed) {
                warn!("remove {} failed, {e}", muxed.display());
            }
        }
    }
}
