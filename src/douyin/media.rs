//! 媒体文件命名与下载任务

use std::path::{Path, PathBuf};

use log::debug;
use url::Url;

use crate::douyin::{
    client::video_page_url,
    model::{Aweme, AwemeKind},
};

/// 图集地址保留的查询参数
pub const IMAGE_QUERY_ALLOW_LIST: [&str; 7] = ["x-expires", "from", "s", "se", "sc", "biz_tag", "l"];
const IMAGE_MARKER: &str = "aweme_images";
const DESC_MAX_CHARS: usize = 40;

/// 单个媒体文件的下载任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub dest: PathBuf,
    pub referer: String,
}

/// 图集地址只保留必要参数, 并请求最高画质
///
/// 不属于图集的地址原样返回
pub fn rewrite_image_url(raw: &str) -> String {
    if !raw.contains(IMAGE_MARKER) {
        return raw.to_string();
    }

    let mut url = match Url::parse(raw) {
        Ok(v) => v,
        Err(e) => {
            debug!("keep unparsable url, {e}");
            return raw.to_string();
        }
    };

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| IMAGE_QUERY_ALLOW_LIST.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if url.path().contains(IMAGE_MARKER) {
        pairs.push(("quality".to_string(), "100".to_string()));
    }

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

/// 描述截断到 40 个字符, 仅保留字母数字、空格和下划线
pub fn sanitize_description(desc: &str) -> String {
    let truncated: String = desc.chars().take(DESC_MAX_CHARS).collect();
    truncated
        .trim()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '_')
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// 文件名主体: `<desc>_<id>_<ts>` 或 `<id>_<ts>`
pub fn base_name(aweme: &Aweme) -> String {
    let safe = sanitize_description(aweme.desc());
    if safe.is_empty() {
        format!("{}_{}", aweme.aweme_id, aweme.create_time)
    } else {
        format!("{}_{}_{}", safe, aweme.aweme_id, aweme.create_time)
    }
}

/// 根据作品类型生成下载任务
///
/// 视频一个任务, 图集每张图一个任务, 其他类型没有任务
pub fn build_tasks(aweme: &Aweme, save_dir: &Path) -> Vec<DownloadTask> {
    let base = base_name(aweme);
    let referer = video_page_url(&aweme.aweme_id);

    match aweme.kind() {
        AwemeKind::Video => aweme
            .video_url()
            .map(|url| DownloadTask {
                url: url.to_string(),
                dest: save_dir.join(format!("{base}.mp4")),
                referer: referer.clone(),
            })
            .into_iter()
            .collect(),
        AwemeKind::Gallery => aweme
            .image_urls()
            .into_iter()
            .map(|(index, url)| DownloadTask {
                url: rewrite_image_url(url),
                dest: save_dir.join(format!("{base}_p{}.jpg", index + 1)),
                referer: referer.clone(),
            })
            .collect(),
        AwemeKind::Other(code) => {
            debug!("skip media of aweme {} with type {code:?}", aweme.aweme_id);
            Vec::new()
        }
    }
}

/// 响应声明为图片而目标扩展名不是 jpg 时修正扩展名
pub fn corrected_destination(dest: &Path, content_type: Option<&str>) -> PathBuf {
    let is_image = content_type
        .map(|v| v.to_lowercase().contains("image"))
        .unwrap_or(false);
    let is_jpg = dest
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("jpg"))
        .unwrap_or(false);

    if is_image && !is_jpg {
        dest.with_extension("jpg")
    } else {
        dest.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn aweme(value: serde_json::Value) -> anyhow::Result<Aweme> {
        Ok(serde_json::from_value(value)?)
    }

    #[test]
    fn test_rewrite_image_url() {
        let raw = "https://p3-sign.douyinpic.com/tos-cn-i-0813/aweme_images/abc~tplv-dy-aweme-images.webp?x-expires=1700&x-signature=zzz&from=327834062&s=PackSourceEnum_AWEME_DETAIL&se=false&sc=image&biz_tag=aweme_images&l=2024";
        let rewritten = rewrite_image_url(raw);
        assert!(rewritten.starts_with(
            "https://p3-sign.douyinpic.com/tos-cn-i-0813/aweme_images/abc~tplv-dy-aweme-images.webp?"
        ));
        assert!(!rewritten.contains("x-signature"));
        assert!(rewritten.contains("x-expires=1700"));
        assert!(rewritten.contains("biz_tag=aweme_images"));
        assert!(rewritten.ends_with("&quality=100"));
    }

    #[test]
    fn test_rewrite_marker_only_in_query() {
        let raw = "https://p3.example.com/img/abc.webp?biz_tag=aweme_images&token=1";
        assert_eq!(
            rewrite_image_url(raw),
            "https://p3.example.com/img/abc.webp?biz_tag=aweme_images"
        );
    }

    #[test]
    fn test_rewrite_non_gallery_unchanged() {
        let raw = "https://v26.example.com/video/tos/abc/?a=6383&br=1";
        assert_eq!(rewrite_image_url(raw), raw);
    }

    #[test]
    fn test_sanitize_description() {
        assert_eq!(sanitize_description("  Hello, World! #tag  "), "Hello World tag");
        assert_eq!(sanitize_description("今天天气很好😀"), "今天天气很好");
        assert_eq!(sanitize_description("!!!"), "");
        let long = "a".repeat(60);
        assert_eq!(sanitize_description(&long).chars().count(), 40);
    }

    #[test]
    fn test_build_video_task() -> anyhow::Result<()> {
        let aweme = aweme(json!({
            "aweme_id": "111", "create_time": 1700000000, "aweme_type": 0, "desc": "My video!",
            "video": {"play_addr": {"url_list": ["https://v/1.mp4", "https://v/backup.mp4"]}}
        }))?;
        let tasks = build_tasks(&aweme, Path::new("/save"));
        assert_eq!(
            tasks,
            vec![DownloadTask {
                url: "https://v/1.mp4".to_string(),
                dest: PathBuf::from("/save/My video_111_1700000000.mp4"),
                referer: "https://www.douyin.com/video/111".to_string(),
            }]
        );
        Ok(())
    }

    #[test]
    fn test_build_gallery_tasks() -> anyhow::Result<()> {
        let aweme = aweme(json!({
            "aweme_id": "222", "create_time": 5, "aweme_type": 2, "desc": "",
            "images": [{"url_list": ["https://i/1.webp"]}, {"url_list": ["https://i/2.webp"]}]
        }))?;
        let tasks = build_tasks(&aweme, Path::new("/save"));
        let dests: Vec<PathBuf> = tasks.iter().map(|t| t.dest.clone()).collect();
        assert_eq!(
            dests,
            vec![
                PathBuf::from("/save/222_5_p1.jpg"),
                PathBuf::from("/save/222_5_p2.jpg")
            ]
        );
        Ok(())
    }

    #[test]
    fn test_build_other_kind_has_no_tasks() -> anyhow::Result<()> {
        let aweme = aweme(json!({"aweme_id": "333", "aweme_type": 51}))?;
        assert!(build_tasks(&aweme, Path::new("/save")).is_empty());
        Ok(())
    }

    #[test]
    fn test_corrected_destination() {
        let mp4 = Path::new("/save/a.mp4");
        assert_eq!(
            corrected_destination(mp4, Some("image/webp")),
            PathBuf::from("/save/a.jpg")
        );
        assert_eq!(corrected_destination(mp4, Some("video/mp4")), mp4);
        assert_eq!(corrected_destination(mp4, None), mp4);
        let jpg = Path::new("/save/a_p1.jpg");
        assert_eq!(corrected_destination(jpg, Some("image/jpeg")), jpg);
    }
}
