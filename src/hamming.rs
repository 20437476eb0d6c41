use std::collections::BinaryHeap;

/// 单个指纹的字节数：pHash + dHash + aHash 各 64 位
pub const CODE_SIZE: usize = 24;
/// 单个指纹的总位数，也是两个指纹之间可能的最大距离
pub const CODE_BITS: u32 = (CODE_SIZE * 8) as u32;

pub type Code = [u8; CODE_SIZE];

#[inline(always)]
pub fn hamming(va: &Code, vb: &Code) -> u32 {
    hamming_24(va, vb)
}

#[inline(always)]
pub fn hamming_naive(va: &[u8], vb: &[u8]) -> u32 {
    va.iter().zip(vb).map(|(a, b)| (a ^ b).count_ones()).sum()
}

#[inline(always)]
pub fn hamming_24(va: &Code, vb: &Code) -> u32 {
    // 按 u64 展开，Code 只保证 1 字节对齐，不能直接 cast_slice
    let word = |v: &Code, i: usize| {
        u64::from_ne_bytes([
            v[i],
            v[i + 1],
            v[i + 2],
            v[i + 3],
            v[i + 4],
            v[i + 5],
            v[i + 6],
            v[i + 7],
        ])
    };
    (word(va, 0) ^ word(vb, 0)).count_ones()
        + (word(va, 8) ^ word(vb, 8)).count_ones()
        + (word(va, 16) ^ word(vb, 16)).count_ones()
}

/// 计算 va 与 codes 中每个向量的汉明距离，返回距离最小的 k 个 (下标, 距离)
///
/// 结果按 (距离, 下标) 升序排列，距离相同时下标小的在前，
/// 因此对同一组输入总是得到相同的结果。
///
/// 参数：
/// - va: 查询向量
/// - codes: 被搜索的向量
/// - k: 返回的最近邻居数量
pub fn knn_hamming(va: &Code, codes: &[Code], k: usize) -> Vec<(usize, u32)> {
    if k == 0 {
        return vec![];
    }
    // 大顶堆，堆顶为当前第 k 近的元素
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (i, code) in codes.iter().enumerate() {
        let d = hamming(va, code);
        if heap.len() < k {
            heap.push((d, i));
        } else if let Some(&top) = heap.peek() {
            if (d, i) < top {
                heap.pop();
                heap.push((d, i));
            }
        }
    }
    heap.into_sorted_vec().into_iter().map(|(d, i)| (i, d)).collect()
}

/// 合并多组已经排好序的 knn 结果，保留最近的 k 个
pub fn merge_knn(parts: impl IntoIterator<Item = Vec<(usize, u32)>>, k: usize) -> Vec<(usize, u32)> {
    let mut all = parts.into_iter().flatten().collect::<Vec<_>>();
    all.sort_unstable_by_key(|&(i, d)| (d, i));
    all.truncate(k);
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_with_bits(bits: &[usize]) -> Code {
        let mut code = [0u8; CODE_SIZE];
        for &b in bits {
            code[b / 8] |= 0x80 >> (b % 8);
        }
        code
    }

    #[test]
    fn test_hamming_identical() {
        let va = [0u8; CODE_SIZE];
        assert_eq!(hamming(&va, &va), 0);
    }

    #[test]
    fn test_hamming_all_different() {
        let va = [0u8; CODE_SIZE];
        let vb = [255u8; CODE_SIZE];
        assert_eq!(hamming(&va, &vb), CODE_BITS);
    }

    #[test]
    fn test_hamming_matches_naive() {
        let va = code_with_bits(&[0, 7, 63, 64, 100, 191]);
        let vb = code_with_bits(&[1, 7, 65, 150]);
        assert_eq!(hamming(&va, &vb), hamming_naive(&va, &vb));
        assert_eq!(hamming(&va, &vb), 8);
    }

    #[test]
    fn test_knn_hamming_sorted() {
        let va = [0u8; CODE_SIZE];
        let codes = vec![code_with_bits(&[1, 2]), code_with_bits(&[]), code_with_bits(&[5])];
        let r = knn_hamming(&va, &codes, 3);
        assert_eq!(r, vec![(1, 0), (2, 1), (0, 2)]);
    }

    #[test]
    fn test_knn_hamming_tie_break_by_index() {
        let va = [0u8; CODE_SIZE];
        let codes = vec![code_with_bits(&[3]), code_with_bits(&[9]), code_with_bits(&[4])];
        let r = knn_hamming(&va, &codes, 2);
        assert_eq!(r, vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn test_knn_hamming_k_limit() {
        let va = [0u8; CODE_SIZE];
        let codes = vec![[255u8; CODE_SIZE]; 2];
        let r = knn_hamming(&va, &codes, 5);
        assert_eq!(r.len(), 2);
        assert!(knn_hamming(&va, &[], 5).is_empty());
        assert!(knn_hamming(&va, &codes, 0).is_empty());
    }

    #[test]
    fn test_merge_knn() {
        let a = vec![(0, 1), (3, 4)];
        let b = vec![(7, 1), (9, 2)];
        assert_eq!(merge_knn([a, b], 3), vec![(0, 1), (7, 1), (9, 2)]);
    }
}
