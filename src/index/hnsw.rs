use hnsw_rs::prelude::*;
use log::debug;

use super::{FingerprintIndex, Neighbor, NeighborSearch};
use crate::fingerprint::Fingerprint;
use crate::hamming::{Code, hamming};

struct CodeHamming;

impl Distance<u8> for CodeHamming {
    fn eval(&self, va: &[u8], vb: &[u8]) -> f32 {
        match (<&Code>::try_from(va), <&Code>::try_from(vb)) {
            (Ok(va), Ok(vb)) => hamming(va, vb) as f32,
            _ => f32::MAX,
        }
    }
}

/// HNSW 搜索参数
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// 每个节点的最大连接数
    pub max_connections: usize,
    /// 构建时的候选列表大小
    pub ef_construction: usize,
    /// 搜索时的候选列表大小
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self { max_connections: 32, ef_construction: 128, ef_search: 64 }
    }
}

/// 基于 HNSW 图的近似搜索，图在加载时构建，不写入磁盘
pub struct HnswSearch {
    hnsw: Hnsw<'static, u8, CodeHamming>,
    params: HnswParams,
}

impl HnswSearch {
    pub fn build(index: &FingerprintIndex, params: HnswParams) -> Self {
        let n = index.len().max(1);
        let nb_layer = 16.min((n as f32).ln().trunc().max(1.) as usize);
        debug!("构建 HNSW 图: {} 个指纹, {} 层", index.len(), nb_layer);
        let hnsw = Hnsw::<u8, _>::new(
            params.max_connections,
            n,
            nb_layer,
            params.ef_construction,
            CodeHamming,
        );
        // 按位置顺序插入，图结构不受线程调度影响
        for (i, code) in index.codes().iter().enumerate() {
            hnsw.insert_slice((code.as_slice(), i));
        }
        Self { hnsw, params }
    }
}

impl NeighborSearch for HnswSearch {
    fn search(&self, index: &FingerprintIndex, query: &Fingerprint, k: usize) -> Vec<Neighbor> {
        if k == 0 || index.is_empty() {
            return vec![];
        }
        let ef = self.params.ef_search.max(k);
        let candidates = self.hnsw.search(query.as_bytes(), ef, ef);

        // 近似结果需要重新计算精确距离，保证排序稳定
        let mut neighbors = candidates
            .into_iter()
            .filter_map(|n| {
                let fp = index.get(n.d_id as u64)?;
                Some(Neighbor { position: n.d_id as u64, distance: query.distance(&fp) })
            })
            .collect::<Vec<_>>();
        neighbors.sort_unstable_by_key(|n| (n.distance, n.position));
        neighbors.dedup_by_key(|n| n.position);
        neighbors.truncate(k);
        neighbors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamming::CODE_SIZE;
    use crate::index::FlatSearch;

    #[test]
    fn test_hnsw_finds_exact_match() {
        let codes = (0..500u32)
            .map(|i| {
                let mut c = [0u8; CODE_SIZE];
                c[..4].copy_from_slice(&i.wrapping_mul(2654435761).to_le_bytes());
                c[4..8].copy_from_slice(&i.to_le_bytes());
                c
            })
            .collect::<Vec<_>>();
        let index = FingerprintIndex::with_codes(codes.clone());
        let search = HnswSearch::build(&index, HnswParams::default());

        let r = search.search(&index, &Fingerprint(codes[123]), 3);
        assert_eq!(r[0], Neighbor { position: 123, distance: 0 });
        assert!(r.windows(2).all(|w| (w[0].distance, w[0].position) < (w[1].distance, w[1].position)));
    }

    #[test]
    fn test_hnsw_matches_flat_on_small_index() {
        let codes = (0..40u8)
            .map(|i| {
                let mut c = [0u8; CODE_SIZE];
                for (j, b) in c.iter_mut().enumerate() {
                    *b = i.wrapping_mul(37).wrapping_add(j as u8 * 11) ^ (i >> 2);
                }
                c
            })
            .collect::<Vec<_>>();
        let index = FingerprintIndex::with_codes(codes.clone());
        let first = HnswSearch::build(&index, HnswParams::default());
        let second = HnswSearch::build(&index, HnswParams::default());

        for code in codes.iter().step_by(7) {
            let query = Fingerprint(*code);
            let expected = FlatSearch.search(&index, &query, 5);
            assert_eq!(first.search(&index, &query, 5), expected);
            assert_eq!(second.search(&index, &query, 5), expected);
        }
    }

    #[test]
    fn test_hnsw_empty() {
        let index = FingerprintIndex::new();
        let search = HnswSearch::build(&index, HnswParams::default());
        assert!(search.search(&index, &Fingerprint([0; CODE_SIZE]), 3).is_empty());
    }
}
