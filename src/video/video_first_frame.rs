//! 保存视频第一帧

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use candle_core::Device;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use log::{error, info};
use pyo3::{
    exceptions::PyRuntimeError,
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyErr, PyResult, Python,
};
use strum_macros::{Display, EnumString};

use crate::{
    core::{category::CATEGORY_VIDEO, utils::image::images_to_batch},
    error::Error,
    video::ffmpeg::Ffmpeg,
    wrapper::{
        comfyui::{
            types::{NODE_IMAGE, NODE_STRING},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

const JPEG_QUALITY: u8 = 95;

/// 输出图片格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FrameFormat {
    Jpg,
    Png,
    Webp,
}

impl FrameFormat {
    pub fn choices() -> Vec<String> {
        [FrameFormat::Jpg, FrameFormat::Png, FrameFormat::Webp]
            .iter()
            .map(|v| v.to_string())
            .collect()
    }
}

/// 按格式写入图片
pub fn save_frame(image: &DynamicImage, dest: &Path, format: FrameFormat) -> Result<(), Error> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    match format {
        FrameFormat::Jpg => {
            let mut writer = BufWriter::new(File::create(dest)?);
            let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
            DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
        }
        FrameFormat::Png => image.save_with_format(dest, ImageFormat::Png)?,
        // image 仅支持无损 webp 编码
        FrameFormat::Webp => {
            DynamicImage::ImageRgba8(image.to_rgba8()).save_with_format(dest, ImageFormat::WebP)?
        }
    }
    Ok(())
}

#[pyclass(subclass)]
pub struct VideoFirstFrame {
    device: Device,
}

impl PromptServer for VideoFirstFrame {}

#[pymethods]
impl VideoFirstFrame {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_IMAGE, NODE_STRING)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("image", "saved_path")
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
        "Save the first frame of a video as an image file."
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
                        video_path.set_item("default", "")?;
                        video_path
                    }),
                )?;
                required.set_item(
                    "output_dir",
                    (NODE_STRING, {
                        let output_dir = PyDict::new(py);
                        output_dir.set_item("default", "output/first_frames")?;
                        output_dir
                    }),
                )?;
                required.set_item(
                    "filename_prefix",
                    (NODE_STRING, {
                        let filename_prefix = PyDict::new(py);
                        filename_prefix.set_item("default", "first_frame")?;
                        filename_prefix
                    }),
                )?;
                required.set_item(
                    "format",
                    (FrameFormat::choices(), {
                        let format = PyDict::new(py);
                        format.set_item("default", FrameFormat::Jpg.to_string())?;
                        format
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
        output_dir: String,
        filename_prefix: String,
        format: String,
    ) -> PyResult<(Bound<'py, PyAny>, String)> {
        let result = self
            .save(&video_path, &output_dir, &filename_prefix, &format)
            .and_then(|(image, saved_path)| {
                let tensor = images_to_batch(&[image], &self.device)?;
                let image = TensorWrapper::<f32>::from_tensor(tensor).to_py_tensor(py)?;
                Ok((image, saved_path.to_string_lossy().to_string()))
            });

        match result {
            Ok(v) => Ok(v),
            Err(e) => {
                error!("VideoFirstFrame error, {e}");
                if let Err(e) = self.send_error(py, "VideoFirstFrame".to_string(), e.to_string()) {
                    error!("send error failed, {e}");
                    return Err(PyErr::new::<PyRuntimeError, _>(e.to_string()));
                };
                Err(PyErr::new::<PyRuntimeError, _>(e.to_string()))
            }
        }
    }
}

impl VideoFirstFrame {
    fn save(
        &self,
        video_path: &str,
        output_dir: &str,
        filename_prefix: &str,
        format: &str,
    ) -> Result<(DynamicImage, PathBuf), Error> {
        let video = PathBuf::from(video_path.trim());
        if !video.is_file() {
            return Err(Error::FileNotFound(video.to_string_lossy().to_string()));
        }
        let format = format
            .parse::<FrameFormat>()
            .map_err(|e| Error::ParseEnumString(e.to_string()))?;

        let image = Ffmpeg::locate()?.first_frame(&video)?;
        let dest = output_path(Path::new(output_dir), filename_prefix, format);
        save_frame(&image, &dest, format)?;
        info!("first frame saved to {}", dest.display());

        Ok((image, dest))
    }
}

/// `<output_dir>/<prefix>.<format>`
pub fn output_path(output_dir: &Path, filename_prefix: &str, format: FrameFormat) -> PathBuf {
    output_dir.join(format!("{}.{format}", filename_prefix.trim()))
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb};

    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("out"), " cover ", FrameFormat::Webp),
            PathBuf::from("out/cover.webp")
        );
        assert_eq!("png".parse::<FrameFormat>().ok(), Some(FrameFormat::Png));
        assert!("gif".parse::<FrameFormat>().is_err());
    }

    #[test]
    fn test_save_frame_formats() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(5, 4, Rgb([200, 100, 50])));

        for format in [FrameFormat::Jpg, FrameFormat::Png, FrameFormat::Webp] {
            let dest = output_path(&dir.path().join("frames"), "first_frame", format);
            save_frame(&image, &dest, format)?;

            let loaded = image::open(&dest)?;
            assert_eq!((loaded.width(), loaded.height()), (5, 4));
        }
        Ok(())
    }

    #[test]
    fn test_save_missing_video() {
        let node = VideoFirstFrame::new();
        assert!(matches!(
            node.save("/nonexistent.mp4", "out", "first_frame", "jpg"),
            Err(Error::FileNotFound(_))
        ));
    }
}
