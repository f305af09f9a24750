//! LUT 调色
//!
//! 解析 Adobe/IRIDAS `.cube` 文件并作用于 RGB 浮点像素
//! 格式说明: https://kono.phpage.fr/images/a/a1/Adobe-cube-lut-specification-1.0.pdf

use std::path::Path;

use crate::{core::utils::text_file::read_to_string_auto, error::Error};

const GAMMA: f32 = 2.2;

/// LUT 表
#[derive(Debug, Clone, PartialEq)]
pub enum LutTable {
    /// 3x1D, 每个通道独立映射
    OneD { size: usize, data: Vec<[f32; 3]> },
    /// 3D, 红色通道变化最快
    ThreeD { size: usize, data: Vec<[f32; 3]> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CubeLut {
    pub title: Option<String>,
    pub domain_min: [f32; 3],
    pub domain_max: [f32; 3],
    pub table: LutTable,
}

impl CubeLut {
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_string_lossy().to_string()));
        }
        let text = read_to_string_auto(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut title = None;
        let mut size_1d: Option<usize> = None;
        let mut size_3d: Option<usize> = None;
        let mut domain_min = [0.0f32; 3];
        let mut domain_max = [1.0f32; 3];
        let mut data: Vec<[f32; 3]> = Vec::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };

            match keyword {
                "TITLE" => {
                    let value = line["TITLE".len()..].trim().trim_matches('"');
                    title = Some(value.to_string());
                }
                "LUT_1D_SIZE" => size_1d = Some(parse_size(parts.next(), line_no)?),
                "LUT_3D_SIZE" => size_3d = Some(parse_size(parts.next(), line_no)?),
                "DOMAIN_MIN" => domain_min = parse_triplet(line, parts, line_no)?,
                "DOMAIN_MAX" => domain_max = parse_triplet(line, parts, line_no)?,
                "LUT_1D_INPUT_RANGE" | "LUT_3D_INPUT_RANGE" => {
                    let values = parts
                        .map(|v| v.parse::<f32>())
                        .collect::<Result<Vec<f32>, _>>()?;
                    if values.len() != 2 {
                        return Err(Error::LutParse(format!(
                            "line {}: input range requires 2 values",
                            line_no + 1
                        )));
                    }
                    domain_min = [values[0]; 3];
                    domain_max = [values[1]; 3];
                }
                _ if keyword.parse::<f32>().is_ok() => {
                    data.push(parse_triplet(line, line.split_whitespace(), line_no)?);
                }
                // 未知关键字忽略
                _ => {}
            }
        }

        let table = match (size_1d, size_3d) {
            (_, Some(size)) => {
                let expected = size * size * size;
                if data.len() != expected {
                    return Err(Error::LutParse(format!(
                        "3D LUT of size {size} requires {expected} rows, found {}",
                        data.len()
                    )));
                }
                LutTable::ThreeD { size, data }
            }
            (Some(size), None) => {
                if data.len() != size {
                    return Err(Error::LutParse(format!(
                        "1D LUT of size {size} requires {size} rows, found {}",
                        data.len()
                    )));
                }
                LutTable::OneD { size, data }
            }
            (None, None) => return Err(Error::LutParse("missing LUT size".to_string())),
        };

        Ok(Self {
            title,
            domain_min,
            domain_max,
            table,
        })
    }

    /// 是否为默认定义域 [0, 1]
    pub fn is_default_domain(&self) -> bool {
        self.domain_min == [0.0; 3] && self.domain_max == [1.0; 3]
    }

    /// 将表中的值限制在定义域内
    pub fn clip_to_domain(&mut self) {
        let (min, max) = (self.domain_min, self.domain_max);
        let data = match &mut self.table {
            LutTable::OneD { data, .. } | LutTable::ThreeD { data, .. } => data,
        };
        for row in data.iter_mut() {
            for c in 0..3 {
                let (lo, hi) = if min[c] <= max[c] {
                    (min[c], max[c])
                } else {
                    (max[c], min[c])
                };
                row[c] = row[c].clamp(lo, hi);
            }
        }
    }

    /// 查表, 输入为定义域内的坐标
    pub fn lookup(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut t = [0.0f32; 3];
        for c in 0..3 {
            let span = self.domain_max[c] - self.domain_min[c];
            let span = if span == 0.0 { 1.0 } else { span };
            t[c] = ((rgb[c] - self.domain_min[c]) / span).clamp(0.0, 1.0);
        }

        match &self.table {
            LutTable::OneD { size, data } => {
                let mut out = [0.0f32; 3];
                for c in 0..3 {
                    let (i0, i1, f) = grid_position(t[c], *size);
                    out[c] = data[i0][c] + (data[i1][c] - data[i0][c]) * f;
                }
                out
            }
            LutTable::ThreeD { size, data } => {
                let size = *size;
                let (r0, r1, fr) = grid_position(t[0], size);
                let (g0, g1, fg) = grid_position(t[1], size);
                let (b0, b1, fb) = grid_position(t[2], size);
                let at = |r: usize, g: usize, b: usize| data[r + g * size + b * size * size];

                let mut out = [0.0f32; 3];
                for (c, value) in out.iter_mut().enumerate() {
                    let c00 = lerp(at(r0, g0, b0)[c], at(r1, g0, b0)[c], fr);
                    let c10 = lerp(at(r0, g1, b0)[c], at(r1, g1, b0)[c], fr);
                    let c01 = lerp(at(r0, g0, b1)[c], at(r1, g0, b1)[c], fr);
                    let c11 = lerp(at(r0, g1, b1)[c], at(r1, g1, b1)[c], fr);
                    let c0 = lerp(c00, c10, fg);
                    let c1 = lerp(c01, c11, fg);
                    *value = lerp(c0, c1, fb);
                }
                out
            }
        }
    }
}

/// LUT 作用参数
#[derive(Debug, Clone, Copy)]
pub struct LutOptions {
    pub gamma_correction: bool,
    /// 小于 1 时与原图混合
    pub strength: f32,
}

impl Default for LutOptions {
    fn default() -> Self {
        Self {
            gamma_correction: true,
            strength: 1.0,
        }
    }
}

/// 作用于交错排列的 RGB 像素 (HWC, 值域 [0, 1])
pub fn apply_lut(lut: &CubeLut, pixels: &mut [f32], options: &LutOptions) -> Result<(), Error> {
    if pixels.len() % 3 != 0 {
        return Err(Error::InvalidTensorShape(format!(
            "pixel buffer length {} is not a multiple of 3",
            pixels.len()
        )));
    }

    let custom_domain = !lut.is_default_domain();
    let strength = options.strength.max(0.0);

    for px in pixels.chunks_exact_mut(3) {
        let original = [px[0], px[1], px[2]];
        let mut rgb = original;

        for c in 0..3 {
            if custom_domain {
                rgb[c] = rgb[c] * (lut.domain_max[c] - lut.domain_min[c]) + lut.domain_min[c];
            }
            if options.gamma_correction {
                rgb[c] = rgb[c].max(0.0).powf(1.0 / GAMMA);
            }
        }

        let mut mapped = lut.lookup(rgb);

        for c in 0..3 {
            if options.gamma_correction {
                mapped[c] = mapped[c].max(0.0).powf(GAMMA);
            }
            if custom_domain {
                let span = lut.domain_max[c] - lut.domain_min[c];
                let span = if span == 0.0 { 1.0 } else { span };
                mapped[c] = (mapped[c] - lut.domain_min[c]) / span;
            }
            px[c] = if strength < 1.0 {
                strength * mapped[c] + (1.0 - strength) * original[c]
            } else {
                mapped[c]
            };
        }
    }

    Ok(())
}

fn lerp(a: f32, b: f32, f: f32) -> f32 {
    a + (b - a) * f
}

/// 归一化坐标在网格中的相邻索引和插值系数
fn grid_position(t: f32, size: usize) -> (usize, usize, f32) {
    let pos = t * (size - 1) as f32;
    let i0 = (pos.floor() as usize).min(size - 1);
    let i1 = (i0 + 1).min(size - 1);
    (i0, i1, pos - i0 as f32)
}

fn parse_size(value: Option<&str>, line_no: usize) -> Result<usize, Error> {
    let size = value
        .ok_or_else(|| Error::LutParse(format!("line {}: missing size", line_no + 1)))?
        .parse::<usize>()?;
    if size < 2 {
        return Err(Error::LutParse(format!(
            "line {}: LUT size must be at least 2",
            line_no + 1
        )));
    }
    Ok(size)
}

fn parse_triplet<'a>(
    line: &str,
    parts: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<[f32; 3], Error> {
    let values = parts
        .map(|v| v.parse::<f32>())
        .collect::<Result<Vec<f32>, _>>()
        .map_err(|e| Error::LutParse(format!("line {}: {e}, {line}", line_no + 1)))?;
    if values.len() != 3 {
        return Err(Error::LutParse(format!(
            "line {}: expected 3 values, {line}",
            line_no + 1
        )));
    }
    Ok([values[0], values[1], values[2]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_3d(size: usize) -> String {
        let mut text = format!("TITLE \"identity\"\nLUT_3D_SIZE {size}\n");
        let step = 1.0 / (size - 1) as f32;
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    text.push_str(&format!(
                        "{} {} {}\n",
                        r as f32 * step,
                        g as f32 * step,
                        b as f32 * step
                    ));
                }
            }
        }
        text
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_parse_3d() -> anyhow::Result<()> {
        let lut = CubeLut::parse(&identity_3d(3))?;
        assert_eq!(lut.title.as_deref(), Some("identity"));
        assert!(lut.is_default_domain());
        assert!(matches!(lut.table, LutTable::ThreeD { size: 3, .. }));
        Ok(())
    }

    #[test]
    fn test_parse_row_count_mismatch() {
        let text = "LUT_3D_SIZE 2\n0 0 0\n1 1 1\n";
        assert!(matches!(CubeLut::parse(text), Err(Error::LutParse(_))));
    }

    #[test]
    fn test_parse_missing_size() {
        assert!(matches!(
            CubeLut::parse("# only comment\n0 0 0\n"),
            Err(Error::LutParse(_))
        ));
    }

    #[test]
    fn test_parse_bad_row() {
        let text = "LUT_1D_SIZE 2\n0 0\n1 1 1\n";
        assert!(matches!(CubeLut::parse(text), Err(Error::LutParse(_))));
    }

    #[test]
    fn test_identity_3d_preserves_pixels() -> anyhow::Result<()> {
        let lut = CubeLut::parse(&identity_3d(5))?;
        let mut pixels = vec![0.1, 0.5, 0.9, 0.0, 1.0, 0.33];
        let expected = pixels.clone();
        let options = LutOptions {
            gamma_correction: false,
            strength: 1.0,
        };
        apply_lut(&lut, &mut pixels, &options)?;
        assert_close(&pixels, &expected);

        // gamma 前后互逆
        let options = LutOptions {
            gamma_correction: true,
            strength: 1.0,
        };
        apply_lut(&lut, &mut pixels, &options)?;
        assert_close(&pixels, &expected);
        Ok(())
    }

    #[test]
    fn test_invert_1d_and_strength_blend() -> anyhow::Result<()> {
        let lut = CubeLut::parse("LUT_1D_SIZE 2\n1 1 1\n0 0 0\n")?;

        let mut pixels = vec![0.25, 0.5, 1.0];
        let full = LutOptions {
            gamma_correction: false,
            strength: 20.0,
        };
        apply_lut(&lut, &mut pixels, &full)?;
        assert_close(&pixels, &[0.75, 0.5, 0.0]);

        let mut pixels = vec![0.2, 0.2, 0.2];
        let half = LutOptions {
            gamma_correction: false,
            strength: 0.5,
        };
        apply_lut(&lut, &mut pixels, &half)?;
        assert_close(&pixels, &[0.5, 0.5, 0.5]);
        Ok(())
    }

    #[test]
    fn test_custom_domain_roundtrip() -> anyhow::Result<()> {
        let text = "DOMAIN_MIN 0 0 0\nDOMAIN_MAX 2 2 2\nLUT_1D_SIZE 2\n0 0 0\n2 2 2\n";
        let lut = CubeLut::parse(text)?;
        assert!(!lut.is_default_domain());

        let mut pixels = vec![0.3, 0.6, 0.9];
        apply_lut(
            &lut,
            &mut pixels,
            &LutOptions {
                gamma_correction: false,
                strength: 1.0,
            },
        )?;
        assert_close(&pixels, &[0.3, 0.6, 0.9]);
        Ok(())
    }

    #[test]
    fn test_clip_to_domain() -> anyhow::Result<()> {
        let mut lut = CubeLut::parse("LUT_1D_SIZE 2\n-0.5 0 0\n1.5 1 1\n")?;
        lut.clip_to_domain();
        match lut.table {
            LutTable::OneD { data, .. } => {
                assert_eq!(data[0][0], 0.0);
                assert_eq!(data[1][0], 1.0);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    #[test]
    fn test_invalid_buffer_length() -> anyhow::Result<()> {
        let lut = CubeLut::parse(&identity_3d(2))?;
        let mut pixels = vec![0.0; 4];
        assert!(apply_lut(&lut, &mut pixels, &LutOptions::default()).is_err());
        Ok(())
    }
}
