use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::EpisodeId;
use crate::error::{Error, Result};

/// 索引中一个位置对应的帧信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// 在索引中的位置，加载时用于校验
    pub position: u64,
    pub anime_id: String,
    pub title: String,
    pub season: u32,
    pub episode: u32,
    /// 在该集中的秒数
    pub elapsed: f64,
    /// 来源视频文件
    pub source: String,
}

impl FrameRecord {
    pub fn new(position: u64, id: &EpisodeId, elapsed: f64, source: impl Into<String>) -> Self {
        Self {
            position,
            anime_id: id.anime_id.clone(),
            title: id.title.clone(),
            season: id.season,
            episode: id.episode,
            elapsed,
            source: source.into(),
        }
    }

    /// 折叠时使用的分组键
    pub fn episode_key(&self) -> (&str, u32, u32) {
        (&self.anime_id, self.season, self.episode)
    }
}

/// 与索引按位置一一对应的元数据表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataTable {
    records: Vec<FrameRecord>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按位置追加一条记录，记录中的位置必须等于当前长度
    pub fn push(&mut self, record: FrameRecord) -> Result<()> {
        if record.position != self.records.len() as u64 {
            return Err(Error::integrity(format!(
                "追加的位置 {} 与元数据长度 {} 不连续",
                record.position,
                self.records.len()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// 获取指定位置的记录，越界说明索引和元数据不同步
    pub fn get(&self, position: u64) -> Result<&FrameRecord> {
        self.records.get(position as usize).ok_or_else(|| {
            Error::integrity(format!("位置 {} 超出元数据范围 {}", position, self.records.len()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter()
    }

    /// 已经收录的来源文件
    pub fn sources(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.source.as_str()).collect()
    }

    /// 校验每条记录保存的位置与实际位置一致
    pub fn validate_positions(&self) -> Result<()> {
        for (i, record) in self.records.iter().enumerate() {
            if record.position != i as u64 {
                return Err(Error::integrity(format!(
                    "元数据第 {} 条记录的位置为 {}",
                    i, record.position
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn from_records(records: Vec<FrameRecord>) -> Self {
        Self { records }
    }
}
