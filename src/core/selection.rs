//! 顺序/随机选择
//!
//! 文件、提示词等列表节点共用的选择逻辑

use rand::{rngs::StdRng, Rng, SeedableRng};
use strum_macros::{Display, EnumString};

use crate::error::Error;

/// 读取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum SelectionMode {
    /// 顺序读取, 到末尾后从头开始
    #[strum(serialize = "sequential")]
    Sequential,
    /// 随机读取
    #[strum(serialize = "random")]
    Random,
}

impl SelectionMode {
    pub fn choices() -> Vec<String> {
        vec![
            SelectionMode::Sequential.to_string(),
            SelectionMode::Random.to_string(),
        ]
    }
}

/// 带游标的选择器
#[derive(Debug, Default)]
pub struct Selector {
    cursor: usize,
}

impl Selector {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    /// 重置顺序模式的游标
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// 从长度为 len 的列表中选择一个索引 (0-based)
    ///
    /// seed 为 0 时使用系统熵源
    pub fn pick(&mut self, len: usize, mode: SelectionMode, seed: u64) -> Result<usize, Error> {
        if len == 0 {
            return Err(Error::ListEmpty);
        }

        let index = match mode {
            SelectionMode::Random => {
                if seed == 0 {
                    rand::rng().random_range(0..len)
                } else {
                    StdRng::seed_from_u64(seed).random_range(0..len)
                }
            }
            SelectionMode::Sequential => {
                if self.cursor >= len {
                    self.cursor = 0;
                }
                let index = self.cursor;
                self.cursor += 1;
                index
            }
        };

        Ok(index)
    }
}
