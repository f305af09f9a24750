//! 下载器配置
//!
//! 时间类参数以 `time_unit_ms` 为单位, 测试时缩小时间单位即可

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 作品列表接口
pub const POST_ENDPOINT: &str = "https://www.douyin.com/aweme/v1/web/aweme/post/";

/// 分页抓取配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// 作品列表接口地址
    pub endpoint: String,
    /// 每页数量
    pub page_size: u32,
    /// 每次请求前的随机等待区间 (单位时间)
    pub pacing: (f64, f64),
    /// 连续失败上限
    pub max_failures: u32,
    /// 退避底数, 等待 base^failures 个单位时间
    pub backoff_base: u32,
    /// 单位时间, 毫秒
    pub time_unit_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            endpoint: POST_ENDPOINT.to_string(),
            page_size: 20,
            pacing: (2.0, 4.0),
            max_failures: 5,
            backoff_base: 3,
            time_unit_ms: 1000,
        }
    }
}

impl CrawlConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pacing(mut self, min: f64, max: f64) -> Self {
        self.pacing = (min, max);
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit_ms = time_unit.as_millis() as u64;
        self
    }

    /// 第 failures 次失败后的退避时长
    pub fn backoff(&self, failures: u32) -> Duration {
        units(
            self.time_unit_ms,
            (self.backoff_base as f64).powi(failures as i32),
        )
    }

    /// 随机的请求间隔
    pub fn pacing_delay(&self) -> Duration {
        units(self.time_unit_ms, random_between(self.pacing))
    }
}

/// 媒体下载配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// 单个文件的最大尝试次数
    pub max_attempts: u32,
    /// 重试前的随机等待区间 (单位时间)
    pub retry_jitter: (f64, f64),
    /// 单次请求总超时 (单位时间)
    pub timeout: f64,
    /// 并发下载数
    pub concurrency: usize,
    /// 单位时间, 毫秒
    pub time_unit_ms: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_jitter: (1.0, 3.0),
            timeout: 30.0,
            concurrency: 3,
            time_unit_ms: 1000,
        }
    }
}

impl DownloadConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_jitter(mut self, min: f64, max: f64) -> Self {
        self.retry_jitter = (min, max);
        self
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = timeout;
        self
    }

    /// 并发数最小为 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit_ms = time_unit.as_millis() as u64;
        self
    }

    pub fn timeout_duration(&self) -> Duration {
        units(self.time_unit_ms, self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        units(self.time_unit_ms, random_between(self.retry_jitter))
    }
}

/// 一次下载任务的完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DouyinConfig {
    /// 浏览器登录后的 Cookie
    pub cookie: String,
    pub crawl: CrawlConfig,
    pub download: DownloadConfig,
}

impl DouyinConfig {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            ..Default::default()
        }
    }

    pub fn with_crawl(mut self, crawl: CrawlConfig) -> Self {
        self.crawl = crawl;
        self
    }

    pub fn with_download(mut self, download: DownloadConfig) -> Self {
        self.download = download;
        self
    }

    /// 同时设置抓取和下载的单位时间
    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.crawl = self.crawl.with_time_unit(time_unit);
        self.download = self.download.with_time_unit(time_unit);
        self
    }
}

/// count 个单位时间, NaN 和负数视为 0, 溢出时取最大值
fn units(time_unit_ms: u64, count: f64) -> Duration {
    let secs = Duration::from_millis(time_unit_ms).as_secs_f64() * count;
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn random_between((min, max): (f64, f64)) -> f64 {
    use rand::Rng;

    if !min.is_finite() || !max.is_finite() || max <= min {
        return min;
    }
    rand::rng().random_range(min..max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DouyinConfig::default();
        assert_eq!(config.crawl.endpoint, POST_ENDPOINT);
        assert_eq!(config.crawl.page_size, 20);
        assert_eq!(config.crawl.max_failures, 5);
        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.download.concurrency, 3);
        assert_eq!(config.download.timeout_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_is_exponential() {
        let config = CrawlConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(3));
        assert_eq!(config.backoff(2), Duration::from_secs(9));
        assert_eq!(config.backoff(4), Duration::from_secs(81));
    }

    #[test]
    fn test_random_delays_within_range() {
        let crawl = CrawlConfig::default();
        let download = DownloadConfig::default();
        for _ in 0..50 {
            let pacing = crawl.pacing_delay();
            assert!(pacing >= Duration::from_secs(2) && pacing <= Duration::from_secs(4));
            let jitter = download.retry_delay();
            assert!(jitter >= Duration::from_secs(1) && jitter <= Duration::from_secs(3));
        }
    }

    #[test]
    fn test_shrunk_time_unit() {
        let config = DouyinConfig::default().with_time_unit(Duration::from_millis(1));
        assert_eq!(config.crawl.backoff(2), Duration::from_millis(9));
        assert!(config.download.retry_delay() <= Duration::from_millis(3));
    }

    #[test]
    fn test_deserialize_partial() -> anyhow::Result<()> {
        let config: DouyinConfig =
            serde_json::from_str(r#"{"cookie": "a=1", "download": {"concurrency": 8}}"#)?;
        assert_eq!(config.cookie, "a=1");
        assert_eq!(config.download.concurrency, 8);
        assert_eq!(config.download.max_attempts, 5);
        assert_eq!(config.crawl, CrawlConfig::default());
        Ok(())
    }

    #[test]
    fn test_large_backoff_saturates() {
        let config = CrawlConfig::default().with_max_failures(100);
        assert!(config.backoff(41) > Duration::from_secs(3u64.pow(30)));
        assert_eq!(config.backoff(1000), Duration::MAX);
    }

    #[test]
    fn test_invalid_ranges_do_not_panic() {
        let crawl = CrawlConfig::default().with_pacing(f64::NAN, f64::NAN);
        assert_eq!(crawl.pacing_delay(), Duration::ZERO);

        let crawl = CrawlConfig::default().with_pacing(-5.0, -1.0);
        assert_eq!(crawl.pacing_delay(), Duration::ZERO);

        let download = DownloadConfig::default()
            .with_retry_jitter(1.0, f64::INFINITY)
            .with_timeout(f64::NAN);
        assert_eq!(download.retry_delay(), Duration::from_secs(1));
        assert_eq!(download.timeout_duration(), Duration::ZERO);
    }

    #[test]
    fn test_concurrency_min_one() {
        assert_eq!(DownloadConfig::default().with_concurrency(0).concurrency, 1);
    }
}
