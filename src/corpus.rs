use std::path::Path;
use std::time::{Duration, SystemTime};

use log::{debug, info};
use serde::Serialize;

use crate::artifact::{self, Artifacts, Schema};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, fingerprint_image, normalize_width};
use crate::index::{FingerprintIndex, FlatSearch, HnswParams, HnswSearch, IndexKind, NeighborSearch};
use crate::metadata::MetadataTable;
use crate::ranker::{Ranker, SearchResult};
use crate::utils::measure;

/// 加载索引时的选项
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub kind: IndexKind,
    pub hnsw: HnswParams,
    /// 要求索引使用指定的构建参数
    pub schema: Option<Schema>,
}

/// 索引大小等统计信息
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub index_size: usize,
    pub metadata_entries: usize,
    pub index_kind: IndexKind,
    pub schema: Schema,
    pub loaded_at: SystemTime,
}

/// 各阶段耗时，单位为毫秒
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Timings {
    pub extract: f64,
    pub search: f64,
    pub rank: f64,
    pub total: f64,
}

/// 一次查询的结果
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub timings: Timings,
}

/// 加载到内存中的只读索引和元数据，可以被多个查询同时使用
pub struct SearchableCorpus {
    schema: Schema,
    index: FingerprintIndex,
    metadata: MetadataTable,
    kind: IndexKind,
    backend: Box<dyn NeighborSearch>,
    loaded_at: SystemTime,
}

impl SearchableCorpus {
    /// 加载索引和元数据，使用精确搜索
    pub fn load(index_path: impl AsRef<Path>, metadata_path: impl AsRef<Path>) -> Result<Self> {
        Self::open(index_path, metadata_path, LoadOptions::default())
    }

    pub fn open(
        index_path: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
        options: LoadOptions,
    ) -> Result<Self> {
        let Artifacts { schema, index, metadata } =
            artifact::load(index_path, metadata_path, options.schema)?;
        let corpus = Self::from_parts(schema, index, metadata, options)?;
        info!("已加载 {} 条指纹，索引类型为 {}", corpus.index.len(), corpus.kind.as_str());
        Ok(corpus)
    }

    /// 使用内存中的索引和元数据构造
    pub fn from_parts(
        schema: Schema,
        index: FingerprintIndex,
        metadata: MetadataTable,
        options: LoadOptions,
    ) -> Result<Self> {
        if index.len() != metadata.len() {
            return Err(Error::integrity(format!(
                "索引数量 {} 与元数据数量 {} 不一致",
                index.len(),
                metadata.len()
            )));
        }
        metadata.validate_positions()?;

        let backend: Box<dyn NeighborSearch> = match options.kind {
            IndexKind::Flat => Box::new(FlatSearch),
            IndexKind::Hnsw => Box::new(HnswSearch::build(&index, options.hnsw)),
        };
        Ok(Self {
            schema,
            index,
            metadata,
            kind: options.kind,
            backend,
            loaded_at: SystemTime::now(),
        })
    }

    pub fn schema(&self) -> Schema {
        self.schema
    }

    pub fn index(&self) -> &FingerprintIndex {
        &self.index
    }

    pub fn metadata(&self) -> &MetadataTable {
        &self.metadata
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            index_size: self.index.len(),
            metadata_entries: self.metadata.len(),
            index_kind: self.kind,
            schema: self.schema,
            loaded_at: self.loaded_at,
        }
    }

    /// 对查询图片做与构建时相同的处理后计算指纹
    pub fn fingerprint_query(&self, data: &[u8]) -> Result<Fingerprint> {
        if data.is_empty() {
            return Err(Error::UnsupportedFormat("空文件".to_string()));
        }
        let img =
            image::load_from_memory(data).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
        fingerprint_image(&normalize_width(img, self.schema.frame_width))
    }

    /// 搜索图片，返回最多 k 条结果
    pub fn search(&self, data: &[u8], k: usize) -> Result<Vec<SearchResult>> {
        Ok(self.search_with(data, k, &Ranker::default())?.results)
    }

    pub fn search_with(&self, data: &[u8], k: usize, ranker: &Ranker) -> Result<SearchOutcome> {
        let (fingerprint, extract) = measure(|| self.fingerprint_query(data));
        let fingerprint = fingerprint?;
        debug!("查询指纹: {:?}", fingerprint);

        let mut search = Duration::ZERO;
        let (results, resolve) = measure(|| {
            ranker.resolve(&self.metadata, k, |pool| {
                let (neighbors, elapsed) =
                    measure(|| self.backend.search(&self.index, &fingerprint, pool));
                search += elapsed;
                neighbors
            })
        });
        let results = results?;

        let ms = |d: Duration| d.as_secs_f64() * 1000.;
        let timings = Timings {
            extract: ms(extract),
            search: ms(search),
            rank: ms(resolve.saturating_sub(search)),
            total: ms(extract + resolve),
        };
        Ok(SearchOutcome { results, timings })
    }

    /// 直接使用指纹搜索
    pub fn search_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        k: usize,
        ranker: &Ranker,
    ) -> Result<Vec<SearchResult>> {
        ranker.resolve(&self.metadata, k, |pool| self.backend.search(&self.index, fingerprint, pool))
    }
}
