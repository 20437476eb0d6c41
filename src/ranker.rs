use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hamming::CODE_BITS;
use crate::index::Neighbor;
use crate::metadata::{FrameRecord, MetadataTable};

/// 初始候选数量为 k 的倍数
const POOL_FACTOR: usize = 4;

/// 距离到相似度的换算方式，结果总在 [0, 100] 之间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Similarity {
    /// 100 × (1 − d / scale)
    Linear { scale: f64 },
    /// 100 × 0.5 ^ (d / half_distance)
    Exponential { half_distance: f64 },
}

impl Default for Similarity {
    fn default() -> Self {
        Self::Linear { scale: CODE_BITS as f64 }
    }
}

impl Similarity {
    pub fn score(&self, distance: u32) -> f64 {
        if distance == 0 {
            return 100.;
        }
        let d = distance as f64;
        let score = match *self {
            Self::Linear { scale } if scale > 0. => 100. * (1. - d / scale),
            Self::Exponential { half_distance } if half_distance > 0. => {
                100. * 0.5f64.powf(d / half_distance)
            }
            _ => 0.,
        };
        if score.is_nan() { 0. } else { score.clamp(0., 100.) }
    }
}

/// 一条最终的搜索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// 从 1 开始的排名
    pub rank: usize,
    pub similarity: f64,
    pub distance: u32,
    pub timecode: String,
    #[serde(flatten)]
    pub record: FrameRecord,
}

/// 排序与去重策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranker {
    pub similarity: Similarity,
    /// 同一集内两个结果的最小时间间隔（秒），不超过该间隔的只保留最好的一个
    pub min_separation: f64,
    /// 超过该距离的候选直接丢弃
    pub max_distance: Option<u32>,
}

impl Default for Ranker {
    fn default() -> Self {
        Self { similarity: Similarity::default(), min_separation: 5., max_distance: None }
    }
}

impl Ranker {
    pub fn new(similarity: Similarity, min_separation: f64, max_distance: Option<u32>) -> Self {
        Self { similarity, min_separation, max_distance }
    }

    /// 从近邻搜索结果中得到最多 k 条结果
    ///
    /// `search` 接收候选数量，返回按 (距离, 位置) 升序排列的近邻。
    /// 去重后不足 k 条时会扩大候选数量重新搜索，直到候选耗尽。
    pub fn resolve<F>(&self, metadata: &MetadataTable, k: usize, mut search: F) -> Result<Vec<SearchResult>>
    where
        F: FnMut(usize) -> Vec<Neighbor>,
    {
        if k == 0 {
            return Ok(vec![]);
        }
        let mut pool = k.saturating_mul(POOL_FACTOR);
        loop {
            let neighbors = search(pool);
            let kept = self.collapse(&neighbors, metadata, k)?;

            let exhausted = neighbors.len() < pool || pool >= metadata.len();
            let beyond = match (self.max_distance, neighbors.last()) {
                (Some(max), Some(last)) => last.distance > max,
                _ => false,
            };
            if kept.len() >= k || exhausted || beyond {
                return Ok(self.finish(kept));
            }
            pool = pool.saturating_mul(2);
        }
    }

    /// 按顺序保留候选，跳过与已保留结果属于同一集且时间过近的候选
    pub fn collapse<'a>(
        &self,
        neighbors: &[Neighbor],
        metadata: &'a MetadataTable,
        k: usize,
    ) -> Result<Vec<(Neighbor, &'a FrameRecord)>> {
        let mut kept: Vec<(Neighbor, &FrameRecord)> = Vec::with_capacity(k);
        for &neighbor in neighbors {
            if kept.len() >= k {
                break;
            }
            if self.max_distance.is_some_and(|max| neighbor.distance > max) {
                break;
            }
            let record = metadata.get(neighbor.position)?;
            let duplicated = kept.iter().any(|(_, other)| {
                other.episode_key() == record.episode_key()
                    && (other.elapsed - record.elapsed).abs() <= self.min_separation
            });
            if !duplicated {
                kept.push((neighbor, record));
            }
        }
        Ok(kept)
    }

    fn finish(&self, kept: Vec<(Neighbor, &FrameRecord)>) -> Vec<SearchResult> {
        let mut results = kept
            .into_iter()
            .map(|(neighbor, record)| SearchResult {
                rank: 0,
                similarity: self.similarity.score(neighbor.distance),
                distance: neighbor.distance,
                timecode: format_timecode(record.elapsed),
                record: record.clone(),
            })
            .collect::<Vec<_>>();
        // 稳定排序，相似度相同时保持 (距离, 位置) 的顺序
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        for (i, r) in results.iter_mut().enumerate() {
            r.rank = i + 1;
        }
        results
    }
}

/// 不足一小时为 `MM:SS`，否则为 `HH:MM:SS`，秒数向下取整
pub fn format_timecode(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0. { seconds.floor() as u64 } else { 0 };
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    if h > 0 { format!("{:02}:{:02}:{:02}", h, m, s) } else { format!("{:02}:{:02}", m, s) }
}
