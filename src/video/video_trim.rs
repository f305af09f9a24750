//! 视频裁剪
//!
//! 按起止时间截取片段, 直接复制音视频流, 不重新编码

use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyErr, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_VIDEO,
    error::Error,
    video::ffmpeg::{expand_time_placeholder, Ffmpeg},
    wrapper::{
        comfy::folder_paths::FolderPaths,
        comfyui::{types::NODE_STRING, PromptServer},
    },
};

pub const DEFAULT_TRIM_FILE: &str = "trimmed_video.mp4";
const TRIM_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

#[pyclass(subclass)]
pub struct VideoTrim {}

impl PromptServer for VideoTrim {}

#[pymethods]
impl VideoTrim {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("output_path",)
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
        "Cut a clip between start_time and end_time (HH:MM:SS, MM:SS or SS) without re-encoding."
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
                    "input_path",
                    (NODE_STRING, {
                        let input_path = PyDict::new(py);
                        input_path.set_item("default", "input/video.mp4")?;
                        input_path
                    }),
                )?;
                required.set_item(
                    "start_time",
                    (NODE_STRING, {
                        let start_time = PyDict::new(py);
                        start_time.set_item("default", "00:00:00")?;
                        start_time
                    }),
                )?;
                required.set_item(
                    "end_time",
                    (NODE_STRING, {
                        let end_time = PyDict::new(py);
                        end_time.set_item("default", "00:00:10")?;
                        end_time
                    }),
                )?;
                required.set_item(
                    "output_path",
                    (NODE_STRING, {
                        let output_path = PyDict::new(py);
                        output_path.set_item("default", "[time]/trimmed_video.mp4")?;
                        output_path.set_item("tooltip", "Relative to the output directory")?;
                        output_path
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute(
        &mut self,
        py: Python,
        input_path: String,
        start_time: String,
        end_time: String,
        output_path: String,
    ) -> PyResult<(String,)> {
        let folder_paths = FolderPaths::resolve(py);
        let result = self.trim(
            folder_paths.output_directory(),
            &input_path,
            &start_time,
            &end_time,
            &output_path,
        );

        match result {
            Ok(v) => Ok((v.to_string_lossy().to_string(),)),
            Err(e) => {
                error!("VideoTrim error, {e}");
                if let Err(e) = self.send_error(py, "VideoTrim".to_string(), e.to_string()) {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl VideoTrim {
    fn trim(
        &self,
        output_directory: &Path,
        input_path: &str,
        start_time: &str,
        end_time: &str,
        output_path: &str,
    ) -> Result<PathBuf, Error> {
        let video = PathBuf::from(input_path.trim());
        if !video.is_file() {
            return Err(Error::FileNotFound(video.to_string_lossy().to_string()));
        }

        let start = parse_timestamp(start_time)?;
        let end = parse_timestamp(end_time)?;
        let ffmpeg = Ffmpeg::locate()?;
        let duration = ffmpeg.duration(&video)?;
        validate_range(start, end, duration)?;

        let dest = output_directory.join(normalize_output_path(&expand_time_placeholder(
            output_path.trim(),
            &Local::now(),
        )));
        ffmpeg.trim(&video, start, end, &dest)?;

        info!(
            "trimmed {} [{start}s, {end}s) to {}",
            video.display(),
            dest.display()
        );
        Ok(dest)
    }
}

/// 解析 `HH:MM:SS`, `MM:SS` 或 `SS`, 各部分可带小数
pub fn parse_timestamp(value: &str) -> Result<f64, Error> {
    let parts = value
        .trim()
        .split(':')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| {
            Error::InvalidParameter(format!("invalid time {value:?}, use HH:MM:SS, MM:SS or SS"))
        })?;
    if parts.len() > 3 {
        return Err(Error::InvalidParameter(format!(
            "invalid time {value:?}, at most hours, minutes and seconds"
        )));
    }
    if parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(Error::InvalidParameter(format!("invalid time {value:?}")));
    }

    Ok(parts.iter().fold(0.0, |acc, v| acc * 60.0 + v))
}

/// 秒数格式化为 `HH:MM:SS`
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn validate_range(start: f64, end: f64, duration: f64) -> Result<(), Error> {
    if start >= end {
        return Err(Error::InvalidParameter(
            "start time must be earlier than end time".to_string(),
        ));
    }
    // 与时长比较时保留两位小数
    let duration = (duration * 100.0).round() / 100.0;
    if end > duration {
        return Err(Error::InvalidParameter(format!(
            "end time exceeds the video duration ({})",
            format_timestamp(duration)
        )));
    }
    Ok(())
}

/// 补全输出文件名
///
/// 没有文件名时使用 `trimmed_video.mp4`, 不支持的扩展名替换为 mp4
pub fn normalize_output_path(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if raw.is_empty() || raw.ends_with('/') || raw.ends_with('\\') {
        return path.join(DEFAULT_TRIM_FILE);
    }

    let supported = path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| TRIM_EXTENSIONS.contains(&v.to_lowercase().as_str()))
        .unwrap_or(false);
    if supported {
        path.to_path_buf()
    } else {
        path.with_extension("mp4")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() -> anyhow::Result<()> {
        assert_eq!(parse_timestamp("00:00:10")?, 10.0);
        assert_eq!(parse_timestamp("01:02:03")?, 3723.0);
        assert_eq!(parse_timestamp("2:30")?, 150.0);
        assert_eq!(parse_timestamp("45")?, 45.0);
        assert_eq!(parse_timestamp(" 1.5 ")?, 1.5);

        assert!(matches!(parse_timestamp("1:2:3:4"), Err(Error::InvalidParameter(_))));
        assert!(matches!(parse_timestamp("ab:10"), Err(Error::InvalidParameter(_))));
        assert!(matches!(parse_timestamp(""), Err(Error::InvalidParameter(_))));
        assert!(matches!(parse_timestamp("-5"), Err(Error::InvalidParameter(_))));
        Ok(())
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.0, 10.0, 10.004).is_ok());
        assert!(matches!(validate_range(5.0, 5.0, 30.0), Err(Error::InvalidParameter(_))));
        assert!(matches!(validate_range(0.0, 31.0, 30.0), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_normalize_output_path() {
        assert_eq!(
            normalize_output_path("clips/"),
            PathBuf::from("clips").join(DEFAULT_TRIM_FILE)
        );
        assert_eq!(normalize_output_path("clips/a"), PathBuf::from("clips/a.mp4"));
        assert_eq!(normalize_output_path("clips/a.MOV"), PathBuf::from("clips/a.MOV"));
        assert_eq!(normalize_output_path("clips/a.mkv"), PathBuf::from("clips/a.mp4"));
        assert_eq!(normalize_output_path(""), PathBuf::from(DEFAULT_TRIM_FILE));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(3723.9), "01:02:03");
        assert_eq!(format_timestamp(5.0), "00:00:05");
    }

    #[test]
    fn test_trim_missing_video() {
        let node = VideoTrim::new();
        let result = node.trim(Path::new("/tmp"), "/nonexistent/video.mp4", "0", "1", "a.mp4");
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
