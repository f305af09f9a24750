//! HTTP 请求头
//!
//! 接口与媒体服务器都需要浏览器特征的 User-Agent 和 Referer

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER, USER_AGENT};

use crate::error::Error;

pub const SITE_REFERER: &str = "https://www.douyin.com/";
const PAGE_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";
const LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// 随机的 Chrome User-Agent
pub fn random_user_agent() -> String {
    let mut rng = rand::rng();
    format!(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.{}.{} Safari/537.36",
        rng.random_range(90..=122),
        rng.random_range(1000..=9999),
        rng.random_range(10..=200),
    )
}

/// 多行粘贴的 Cookie 合并为单行
pub fn normalize_cookie(cookie: &str) -> String {
    cookie
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 基础请求头, 每次调用生成新的 User-Agent
pub fn base_headers(cookie: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(&random_user_agent())?);
    headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));
    headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE));

    let cookie = normalize_cookie(cookie);
    if !cookie.is_empty() {
        headers.insert(COOKIE, header_value(&cookie)?);
    }
    Ok(headers)
}

/// 媒体请求头, Referer 指向作品页
pub fn media_headers(cookie: &str, referer: &str, url: &str) -> Result<HeaderMap, Error> {
    let mut headers = base_headers(cookie)?;
    headers.insert(REFERER, header_value(referer)?);

    let accept = if is_image_url(url) { IMAGE_ACCEPT } else { "*/*" };
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    Ok(headers)
}

/// 作品页地址
pub fn video_page_url(aweme_id: &str) -> String {
    format!("https://www.douyin.com/video/{aweme_id}")
}

fn is_image_url(url: &str) -> bool {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    path.ends_with(".jpg") || path.ends_with(".webp")
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::InvalidParameter(format!("invalid header value, {e}")))
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;

    #[test]
    fn test_random_user_agent() -> anyhow::Result<()> {
        let re = Regex::new(r"Chrome/(\d+)\.0\.(\d+)\.(\d+) Safari/537\.36$")?;
        for _ in 0..20 {
            let ua = random_user_agent();
            let caps = re.captures(&ua).ok_or_else(|| anyhow::anyhow!("bad ua {ua}"))?;
            let major: u32 = caps[1].parse()?;
            let build: u32 = caps[2].parse()?;
            let patch: u32 = caps[3].parse()?;
            assert!((90..=122).contains(&major));
            assert!((1000..=9999).contains(&build));
            assert!((10..=200).contains(&patch));
        }
        Ok(())
    }

    #[test]
    fn test_multiline_cookie() -> anyhow::Result<()> {
        assert_eq!(normalize_cookie("a=1;\n  b=2;\r\n\n"), "a=1; b=2;");
        let headers = base_headers("a=1;\nb=2")?;
        assert_eq!(headers.get(COOKIE).map(|v| v.as_bytes()), Some(&b"a=1; b=2"[..]));
        Ok(())
    }

    #[test]
    fn test_media_headers() -> anyhow::Result<()> {
        let referer = video_page_url("123");
        let headers = media_headers("", &referer, "https://p3.example.com/a/b.webp?x=1")?;
        assert_eq!(headers.get(ACCEPT).map(|v| v.as_bytes()), Some(IMAGE_ACCEPT.as_bytes()));
        assert_eq!(
            headers.get(REFERER).map(|v| v.as_bytes()),
            Some(&b"https://www.douyin.com/video/123"[..])
        );
        assert!(headers.get(COOKIE).is_none());

        let headers = media_headers("", &referer, "https://v.example.com/play/?video_id=1")?;
        assert_eq!(headers.get(ACCEPT).map(|v| v.as_bytes()), Some(&b"*/*"[..]));
        Ok(())
    }
}
