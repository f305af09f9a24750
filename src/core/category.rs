//! 节点分类

/// 抖音
pub const CATEGORY_DOUYIN: &str = "CreatorKit/Douyin";
/// 文本
pub const CATEGORY_TEXT: &str = "CreatorKit/Text";
/// 图片
pub const CATEGORY_IMAGE: &str = "CreatorKit/Image";
/// 视频
pub const CATEGORY_VIDEO: &str = "CreatorKit/Video";
/// 模型
pub const CATEGORY_MODEL: &str = "CreatorKit/Model";
