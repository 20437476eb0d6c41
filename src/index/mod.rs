mod flat;
mod hnsw;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use self::flat::*;
pub use self::hnsw::*;
use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::hamming::{CODE_SIZE, Code};

/// 最近邻搜索结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// 在索引中的位置
    pub position: u64,
    /// 与查询指纹的汉明距离
    pub distance: u32,
}

/// 搜索使用的索引结构
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// 精确的暴力搜索
    #[default]
    Flat,
    /// HNSW 近似搜索，候选结果会再次精确排序
    Hnsw,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Hnsw => "hnsw",
        }
    }
}

/// 只追加的指纹集合，位置即为插入顺序
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    codes: Vec<Code>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes(codes: Vec<Code>) -> Self {
        Self { codes }
    }

    /// 从连续的字节中恢复索引，长度必须是指纹大小的整数倍
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() % CODE_SIZE != 0 {
            return Err(Error::integrity(format!(
                "索引数据长度 {} 不是 {} 的整数倍",
                data.len(),
                CODE_SIZE
            )));
        }
        let codes: &[Code] = bytemuck::cast_slice(data);
        Ok(Self { codes: codes.to_vec() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.codes)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// 追加一个指纹，返回其位置
    pub fn push(&mut self, fingerprint: &Fingerprint) -> u64 {
        self.codes.push(*fingerprint.as_bytes());
        (self.codes.len() - 1) as u64
    }

    pub fn get(&self, position: u64) -> Option<Fingerprint> {
        self.codes.get(position as usize).map(|c| Fingerprint(*c))
    }

    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// 对整个索引计算摘要，用于确认索引和元数据来自同一次构建
    pub fn digest(&self) -> [u8; 32] {
        *blake3::hash(self.as_bytes()).as_bytes()
    }
}

/// 最近邻搜索后端
pub trait NeighborSearch: Send + Sync {
    /// 返回最多 k 个结果，按 (距离, 位置) 升序排列
    fn search(&self, index: &FingerprintIndex, query: &Fingerprint, k: usize) -> Vec<Neighbor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_round_trip() {
        let mut index = FingerprintIndex::new();
        assert_eq!(index.push(&Fingerprint([1; CODE_SIZE])), 0);
        assert_eq!(index.push(&Fingerprint([2; CODE_SIZE])), 1);
        let restored = FingerprintIndex::from_bytes(index.as_bytes()).unwrap();
        assert_eq!(restored.codes(), index.codes());
        assert_eq!(restored.digest(), index.digest());
    }

    #[test]
    fn test_from_bytes_bad_length() {
        assert!(matches!(FingerprintIndex::from_bytes(&[0; 25]), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_digest_changes() {
        let a = FingerprintIndex::with_codes(vec![[0; CODE_SIZE]]);
        let b = FingerprintIndex::with_codes(vec![[0; CODE_SIZE], [0; CODE_SIZE]]);
        assert_ne!(a.digest(), b.digest());
    }
}
