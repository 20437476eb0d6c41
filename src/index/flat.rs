use rayon::prelude::*;

use super::{FingerprintIndex, Neighbor, NeighborSearch};
use crate::fingerprint::Fingerprint;
use crate::hamming::{knn_hamming, merge_knn};

/// 每个线程一次扫描的指纹数量
const CHUNK_SIZE: usize = 1 << 16;

/// 精确搜索，逐一计算汉明距离
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatSearch;

impl NeighborSearch for FlatSearch {
    fn search(&self, index: &FingerprintIndex, query: &Fingerprint, k: usize) -> Vec<Neighbor> {
        let codes = index.codes();
        let query = query.as_bytes();
        let k = k.min(codes.len());

        let result = if codes.len() <= CHUNK_SIZE {
            knn_hamming(query, codes, k)
        } else {
            let parts = codes
                .par_chunks(CHUNK_SIZE)
                .enumerate()
                .map(|(n, chunk)| {
                    knn_hamming(query, chunk, k)
                        .into_iter()
                        .map(|(i, d)| (n * CHUNK_SIZE + i, d))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            merge_knn(parts, k)
        };

        result.into_iter().map(|(i, d)| Neighbor { position: i as u64, distance: d }).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamming::{CODE_SIZE, Code};

    fn code(byte: u8) -> Code {
        let mut c = [0u8; CODE_SIZE];
        c[0] = byte;
        c
    }

    #[test]
    fn test_empty_index() {
        let index = FingerprintIndex::new();
        assert!(FlatSearch.search(&index, &Fingerprint(code(0)), 5).is_empty());
    }

    #[test]
    fn test_order_and_ties() {
        let index = FingerprintIndex::with_codes(vec![code(0b11), code(0b1), code(0b10), code(0)]);
        let r = FlatSearch.search(&index, &Fingerprint(code(0)), 10);
        let positions = r.iter().map(|n| n.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![3, 1, 2, 0]);
        assert_eq!(r.iter().map(|n| n.distance).collect::<Vec<_>>(), vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_chunked_matches_single() {
        // 超过 CHUNK_SIZE 时走并行分块路径
        let n = CHUNK_SIZE + 100;
        let codes = (0..n).map(|i| code((i % 256) as u8)).collect::<Vec<_>>();
        let index = FingerprintIndex::with_codes(codes.clone());
        let query = Fingerprint(code(0b1010_1010));
        let r = FlatSearch.search(&index, &query, 20);
        let expected = knn_hamming(query.as_bytes(), &codes, 20);
        assert_eq!(r.len(), 20);
        for (n, (i, d)) in r.iter().zip(expected) {
            assert_eq!((n.position, n.distance), (i as u64, d));
        }
    }
}
