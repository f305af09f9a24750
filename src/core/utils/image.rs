//! image 与 tensor 相互转换
//!
use std::path::Path;

use candle_core::{Device, Tensor};
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};

use crate::error::Error;

/// 将张量转换为图像
///
/// samples: NHWC, C 为 3
pub fn tensor_to_images(samples: &Tensor) -> Result<Vec<DynamicImage>, Error> {
    let (batch, height, width, channels) = samples.dims4()?;
    if channels != 3 {
        return Err(Error::InvalidTensorShape(format!(
            "expected 3 channels, got {channels}"
        )));
    }

    let mut images = Vec::with_capacity(batch);
    for index in 0..batch {
        let values = samples
            .get(index)?
            .to_device(&Device::Cpu)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let data: Vec<u8> = values
            .iter()
            .map(|&x| (255.0 * x).round().clamp(0.0, 255.0) as u8)
            .collect();

        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(width as u32, height as u32, data).ok_or_else(|| {
                Error::InvalidTensorShape(format!("{:?}", samples.dims()))
            })?;
        images.push(DynamicImage::ImageRgb8(buffer));
    }

    Ok(images)
}

/// 将图像转换为张量
///
/// output: HWC
pub fn image_to_tensor(image: &DynamicImage, device: &Device) -> Result<Tensor, Error> {
    let (width, height) = image.dimensions();

    let img_buffer = image.to_rgb32f().into_raw();
    // HWC
    let tensor = Tensor::from_vec(img_buffer, (height as usize, width as usize, 3), device)?;

    Ok(tensor)
}

/// 将多张图像合并为一个批次
///
/// output: NHWC, 所有图像尺寸必须一致
pub fn images_to_batch(images: &[DynamicImage], device: &Device) -> Result<Tensor, Error> {
    if images.is_empty() {
        return Err(Error::ListEmpty);
    }

    let tensors = images
        .iter()
        .map(|image| image_to_tensor(image, device))
        .collect::<Result<Vec<Tensor>, Error>>()?;

    let batch = Tensor::stack(&tensors, 0)?;
    Ok(batch)
}

/// 读取图片文件并转换为 [1, H, W, C] 的张量
pub fn load_image_batch(path: &Path, device: &Device) -> Result<Tensor, Error> {
    let image = image::open(path)?;
    images_to_batch(&[image], device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, pixel: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(pixel)))
    }

    #[test]
    fn test_image_to_tensor_shape() -> anyhow::Result<()> {
        let tensor = image_to_tensor(&solid(4, 2, [255, 0, 0]), &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[2, 4, 3]);

        let values = tensor.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(&values[..3], &[1.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_images_to_batch() -> anyhow::Result<()> {
        let images = vec![solid(3, 3, [0, 0, 0]), solid(3, 3, [255, 255, 255])];
        let batch = images_to_batch(&images, &Device::Cpu)?;
        assert_eq!(batch.dims(), &[2, 3, 3, 3]);
        Ok(())
    }

    #[test]
    fn test_images_to_batch_empty() {
        assert!(matches!(
            images_to_batch(&[], &Device::Cpu),
            Err(Error::ListEmpty)
        ));
    }

    #[test]
    fn test_tensor_to_images() -> anyhow::Result<()> {
        let images = vec![solid(3, 2, [255, 0, 0]), solid(3, 2, [0, 128, 255])];
        let batch = images_to_batch(&images, &Device::Cpu)?;

        let restored = tensor_to_images(&batch)?;
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].dimensions(), (3, 2));
        assert_eq!(restored[1].to_rgb8().get_pixel(2, 1), &Rgb([0, 128, 255]));
        Ok(())
    }

    #[test]
    fn test_tensor_to_images_rejects_alpha() -> anyhow::Result<()> {
        let tensor = Tensor::zeros((1, 2, 2, 4), candle_core::DType::F32, &Device::Cpu)?;
        assert!(matches!(
            tensor_to_images(&tensor),
            Err(Error::InvalidTensorShape(_))
        ));
        Ok(())
    }
}
