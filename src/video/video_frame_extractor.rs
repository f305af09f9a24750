//! 视频抽帧与音频提取

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use chrono::Local;
use log::{debug, error, info, warn};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};

use crate::{
    core::{category::CATEGORY_VIDEO, utils::image::images_to_batch},
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

/// 抽帧结果
struct Extraction {
    video_path: String,
    frames: Tensor,
    audio_path: String,
    first_frame: Tensor,
}

#[pyclass(subclass)]
pub struct VideoFrameExtractor {
    device: Device,
}

impl PromptServer for VideoFrameExtractor {}

#[pymethods]
impl VideoFrameExtractor {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str) {
        (NODE_STRING, NODE_IMAGE, NODE_STRING, NODE_IMAGE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str) {
        ("video_path", "frames", "audio_path", "first_frame")
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
        "Extract every Nth frame and the audio track of a video with ffmpeg. [time] in a directory is replaced by the current timestamp."
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
                    "video_path",
                    (NODE_STRING, {
                        let video_path = PyDict::new(py);
                        video_path.set_item("default", "input/video.mp4")?;
                        video_path
                    }),
                )?;
                required.set_item(
                    "frame_output_dir",
                    (NODE_STRING, {
                        let frame_output_dir = PyDict::new(py);
                        frame_output_dir.set_item("default", "[time]/frames")?;
                        frame_output_dir
                    }),
                )?;
                required.set_item(
                    "audio_output_dir",
                    (NODE_STRING, {
                        let audio_output_dir = PyDict::new(py);
                        audio_output_dir.set_item("default", "[time]/audio")?;
                        audio_output_dir
                    }),
                )?;
                required.set_item(
                    "extract_interval",
                    (NODE_INT, {
                        let extract_interval = PyDict::new(py);
                        extract_interval.set_item("default", 1)?;
                        extract_interval.set_item("min", 1)?;
                        extract_interval.set_item("max", 60)?;
                        extract_interval.set_item("step", 1)?;
                        extract_interval
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
        video_path: String,
        frame_output_dir: String,
        audio_output_dir: String,
        extract_interval: usize,
    ) -> PyResult<(String, Bound<'py, PyAny>, String, Bound<'py, PyAny>)> {
        let folder_paths = FolderPaths::resolve(py);
        let result = self
            .extract(
                folder_paths.output_directory(),
                &video_path,
                &frame_output_dir,
                &audio_output_dir,
                extract_interval,
            )
            .and_then(|v| {
                let frames = TensorWrapper::<f32>::from_tensor(v.frames).to_py_tensor(py)?;
                let first_frame = TensorWrapper::<f32>::from_tensor(v.first_frame).to_py_tensor(py)?;
                Ok((v.video_path, frames, v.audio_path, first_frame))
            });

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("VideoFrameExtractor error, {e}");
                if let Err(e) =
                    self.send_error(py, "VideoFrameExtractor".to_string(), e.to_string())
                {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl VideoFrameExtractor {
    fn extract(
        &self,
        output_directory: &Path,
        video_path: &str,
        frame_output_dir: &str,
        audio_output_dir: &str,
        interval: usize,
    ) -> Result<Extraction, Error> {
        let video = PathBuf::from(video_path.trim());
        if !video.is_file() {
            return Err(Error::FileNotFound(video.to_string_lossy().to_string()));
        }

        let ffmpeg = Ffmpeg::locate()?;
        let now = Local::now();
        let frame_dir = output_directory.join(expand_time_placeholder(frame_output_dir, &now));
        let audio_dir = output_directory.join(expand_time_placeholder(audio_output_dir, &now));

        let frame_files = ffmpeg.extract_frames(&video, &frame_dir, interval)?;
        info!(
            "extracted {} frames to {}",
            frame_files.len(),
            frame_dir.display()
        );
        let frames = self.load_frames(&frame_files)?;

        // 视频没有音轨时 ffmpeg 会失败, 不影响抽帧结果
        let audio_path = match ffmpeg.extract_audio(&video, &audio_dir) {
            Ok(v) => v.to_string_lossy().to_string(),
            Err(e) => {
                warn!("extract audio failed, {e}");
                String::new()
            }
        };

        let first_frame = images_to_batch(&[ffmpeg.first_frame(&video)?], &self.device)?;

        Ok(Extraction {
            video_path: video.to_string_lossy().to_string(),
            frames,
            audio_path,
            first_frame,
        })
    }

    /// 没有帧时返回 [0, 1, 1, 3] 的空批次
    fn load_frames(&self, files: &[PathBuf]) -> Result<Tensor, Error> {
        if files.is_empty() {
            return Ok(Tensor::zeros((0, 1, 1, 3), candle_core::DType::F32, &self.device)?);
        }

        let images = files
            .iter()
            .map(|path| {
                debug!("load frame {}", path.display());
                image::open(path).map_err(Error::from)
            })
            .collect::<Result<Vec<_>, Error>>()?;
        images_to_batch(&images, &self.device)
    }
}
