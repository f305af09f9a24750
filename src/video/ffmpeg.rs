//! ffmpeg 命令封装
//!
//! 依赖系统中的 ffmpeg 可执行文件

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Command,
    time::{SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Local};
use image::DynamicImage;
use log::{debug, warn};
use regex::Regex;

use crate::{core::utils::directory::scan_files, error::Error};

pub const FRAME_PREFIX: &str = "frame_";
pub const AUDIO_FILE: &str = "audio.mp3";
const TIME_PLACEHOLDER: &str = "[time]";

/// 将路径中的 `[time]` 替换为 `%Y%m%d-%H%M%S`
pub fn expand_time_placeholder(path: &str, now: &DateTime<Local>) -> String {
    path.replace(TIME_PLACEHOLDER, &now.format("%Y%m%d-%H%M%S").to_string())
}

#[derive(Debug, Clone)]
pub struct Ffmpeg {
    binary: PathBuf,
}

impl Ffmpeg {
    /// 检查 ffmpeg 是否可用
    pub fn locate() -> Result<Self, Error> {
        let binary = PathBuf::from("ffmpeg");
        let output = Command::new(&binary)
            .arg("-version")
            .output()
            .map_err(|e| Error::FfmpegNotFound(e.to_string()))?;
        if !output.status.success() {
            return Err(Error::FfmpegNotFound(format!(
                "ffmpeg -version exited with {}",
                output.status
            )));
        }
        Ok(Self { binary })
    }

    /// 读取视频时长 (秒)
    ///
    /// 只传入输入文件时 ffmpeg 以非零状态退出, 时长信息在 stderr 中
    pub fn duration(&self, video: &Path) -> Result<f64, Error> {
        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-i")
            .arg(video)
            .output()
            .map_err(|e| Error::FfmpegNotFound(e.to_string()))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_duration(&stderr)?
            .ok_or_else(|| Error::FfmpegFailed(format!("no duration for {}", video.display())))
    }

    /// 截取 [start, end) 秒, 直接复制音视频流
    pub fn trim(&self, video: &Path, start: f64, end: f64, dest: &Path) -> Result<(), Error> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        self.run(trim_args(video, start, end, dest))
    }

    /// 按文件名模板将图片序列编码为视频
    pub fn encode_frames(
        &self,
        frames_dir: &Path,
        pattern: &str,
        frame_rate: u32,
        codec: &[&str],
        dest: &Path,
    ) -> Result<(), Error> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        self.run(encode_args(frames_dir, pattern, frame_rate, codec, dest))
    }

    /// 合并音轨, 以较短的一方为准
    pub fn mux_audio(&self, video: &Path, audio: &Path, dest: &Path) -> Result<(), Error> {
        self.run(mux_args(video, audio, dest))
    }

    fn run(&self, args: Vec<OsString>) -> Result<(), Error> {
        debug!("ffmpeg {args:?}");
        let output = Command::new(&self.binary)
            .args(&args)
            .output()
            .map_err(|e| Error::FfmpegNotFound(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::FfmpegFailed(stderr.trim().to_string()));
        }
        Ok(())
    }

    /// 将第一帧写入 dest, 格式由扩展名决定
    pub fn save_first_frame(&self, video: &Path, dest: &Path) -> Result<(), Error> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        self.run(first_frame_args(video, dest))
    }

    /// 解码第一帧
    pub fn first_frame(&self, video: &Path) -> Result<DynamicImage, Error> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let temp = std::env::temp_dir().join(format!(
            "creator_kit_first_frame_{}_{nanos}.png",
            std::process::id()
        ));

        self.save_first_frame(video, &temp)?;
        let image = image::open(&temp);
        if let Err(e) = fs::remove_file(&temp) {
            warn!("remove temp frame failed, {e}");
        }
        Ok(image?)
    }

    /// 每隔 interval 帧导出一张 png, 返回按名称排序的帧文件
    pub fn extract_frames(
        &self,
        video: &Path,
        output_dir: &Path,
        interval: usize,
    ) -> Result<Vec<PathBuf>, Error> {
        fs::create_dir_all(output_dir)?;
        self.run(frames_args(video, output_dir, interval))?;

        let frames = scan_files(output_dir, &["png"], false)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FRAME_PREFIX))
                    .unwrap_or(false)
            })
            .collect();
        Ok(frames)
    }

    /// 导出音轨为 mp3
    pub fn extract_audio(&self, video: &Path, output_dir: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(output_dir)?;
        let dest = output_dir.join(AUDIO_FILE);
        self.run(audio_args(video, &dest))?;
        Ok(dest)
    }
}

fn first_frame_args(video: &Path, dest: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-frames:v".into(),
        "1".into(),
        dest.as_os_str().to_os_string(),
    ]
}

fn frames_args(video: &Path, output_dir: &Path, interval: usize) -> Vec<OsString> {
    let interval = interval.max(1);
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-vf".into(),
        format!("select=not(mod(n\\,{interval}))").into(),
        "-vsync".into(),
        "vfr".into(),
        output_dir
            .join(format!("{FRAME_PREFIX}%06d.png"))
            .into_os_string(),
    ]
}

fn audio_args(video: &Path, dest: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-q:a".into(),
        "0".into(),
        "-map".into(),
        "a".into(),
        dest.as_os_str().to_os_string(),
    ]
}

fn trim_args(video: &Path, start: f64, end: f64, dest: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-ss".into(),
        start.to_string().into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-t".into(),
        (end - start).to_string().into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "1".into(),
        dest.as_os_str().to_os_string(),
    ]
}

fn encode_args(
    frames_dir: &Path,
    pattern: &str,
    frame_rate: u32,
    codec: &[&str],
    dest: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-framerate".into(),
        frame_rate.max(1).to_string().into(),
        "-i".into(),
        frames_dir.join(pattern).into_os_string(),
    ];
    args.extend(codec.iter().map(OsString::from));
    args.push(dest.as_os_str().to_os_string());
    args
}

fn mux_args(video: &Path, audio: &Path, dest: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-v".into(),
        "error".into(),
        "-i".into(),
        video.as_os_str().to_os_string(),
        "-i".into(),
        audio.as_os_str().to_os_string(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-shortest".into(),
        dest.as_os_str().to_os_string(),
    ]
}

/// 从 ffmpeg 输出中解析 `Duration: HH:MM:SS.xx`, 时长为 N/A 时返回 None
fn parse_duration(stderr: &str) -> Result<Option<f64>, Error> {
    let re = Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)")?;
    let Some(caps) = re.captures(stderr) else {
        return Ok(None);
    };
    let hours: f64 = caps[1].parse()?;
    let minutes: f64 = caps[2].parse()?;
    let seconds: f64 = caps[3].parse()?;
    Ok(Some(hours * 3600.0 + minutes * 60.0 + seconds))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_expand_time_placeholder() {
        let now = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 1)
            .single()
            .unwrap_or_else(Local::now);
        let expected = now.format("%Y%m%d-%H%M%S").to_string();
        assert_eq!(
            expand_time_placeholder("[time]/frames", &now),
            format!("{expected}/frames")
        );
        assert_eq!(expand_time_placeholder("fixed/audio", &now), "fixed/audio");
    }

    #[test]
    fn test_frames_args() {
        let args = frames_args(Path::new("in.mp4"), Path::new("out"), 5);
        assert!(args.contains(&OsString::from("select=not(mod(n\\,5))")));
        assert_eq!(
            args.last(),
            Some(&Path::new("out").join("frame_%06d.png").into_os_string())
        );

        // 间隔最小为 1
        let args = frames_args(Path::new("in.mp4"), Path::new("out"), 0);
        assert!(args.contains(&OsString::from("select=not(mod(n\\,1))")));
    }

    #[test]
    fn test_audio_args() {
        let args = audio_args(Path::new("in.mp4"), Path::new("out/audio.mp3"));
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-v", "error", "-i", "in.mp4", "-q:a", "0", "-map", "a", "out/audio.mp3"
            ]
        );
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().to_string()).collect()
    }

    #[test]
    fn test_trim_args() {
        let args = strings(&trim_args(Path::new("in.mp4"), 1.5, 4.0, Path::new("out.mp4")));
        assert_eq!(
            args,
            vec![
                "-y", "-v", "error", "-ss", "1.5", "-i", "in.mp4", "-t", "2.5", "-c:v", "copy",
                "-c:a", "copy", "-avoid_negative_ts", "1", "out.mp4"
            ]
        );
    }

    #[test]
    fn test_encode_and_mux_args() {
        let args = strings(&encode_args(
            Path::new("frames"),
            "frame_%06d.png",
            24,
            &["-c:v", "mpeg4"],
            Path::new("out.avi"),
        ));
        assert_eq!(&args[3..5], &["-framerate", "24"]);
        assert_eq!(args[6], Path::new("frames").join("frame_%06d.png").to_string_lossy());
        assert_eq!(&args[7..], &["-c:v", "mpeg4", "out.avi"]);

        let args = strings(&mux_args(Path::new("v.mp4"), Path::new("a.mp3"), Path::new("o.mp4")));
        assert!(args.windows(2).any(|w| w == ["-map", "1:a:0"]));
        assert!(args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("o.mp4"));
    }

    #[test]
    fn test_parse_duration() -> anyhow::Result<()> {
        let stderr = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'a.mp4':\n  Duration: 00:01:02.50, start: 0.000000, bitrate: 1000 kb/s\nAt least one output file must be specified";
        assert_eq!(parse_duration(stderr)?, Some(62.5));
        assert_eq!(parse_duration("  Duration: N/A, bitrate: N/A")?, None);
        assert_eq!(parse_duration("")?, None);
        Ok(())
    }

    #[test]
    #[ignore]
    fn test_locate() -> anyhow::Result<()> {
        Ffmpeg::locate()?;
        Ok(())
    }
}
