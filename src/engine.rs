use std::io;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use log::{info, warn};

use crate::corpus::{CorpusStats, LoadOptions, SearchOutcome, SearchableCorpus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::ranker::Ranker;

/// 服务端持有的检索状态
///
/// 已加载的索引作为一个不可变的快照保存，查询时只克隆 `Arc`，
/// 重新加载时先完整构建新的快照，再整体替换。
pub struct Engine {
    corpus: RwLock<Option<Arc<SearchableCorpus>>>,
    ranker: Ranker,
}

impl Engine {
    pub fn new(ranker: Ranker) -> Self {
        Self { corpus: RwLock::new(None), ranker }
    }

    pub fn with_corpus(corpus: SearchableCorpus, ranker: Ranker) -> Self {
        Self { corpus: RwLock::new(Some(Arc::new(corpus))), ranker }
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// 从磁盘加载索引并替换当前快照，加载失败时保留旧的快照
    pub fn reload(
        &self,
        index_path: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
        options: LoadOptions,
    ) -> Result<()> {
        let corpus = SearchableCorpus::open(index_path, metadata_path, options).inspect_err(|e| {
            warn!("加载索引失败: {}", e);
        })?;
        self.install(corpus);
        Ok(())
    }

    /// 替换当前快照，返回旧的快照
    pub fn install(&self, corpus: SearchableCorpus) -> Option<Arc<SearchableCorpus>> {
        let corpus = Arc::new(corpus);
        info!("切换到新的索引: {} 条指纹", corpus.index().len());
        let mut guard = self.corpus.write().unwrap_or_else(PoisonError::into_inner);
        guard.replace(corpus)
    }

    /// 当前快照，未加载时返回 `EmptyIndex`
    pub fn snapshot(&self) -> Result<Arc<SearchableCorpus>> {
        let guard = self.corpus.read().unwrap_or_else(PoisonError::into_inner);
        guard.clone().ok_or(Error::EmptyIndex)
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_ok()
    }

    pub fn stats(&self) -> Result<CorpusStats> {
        Ok(self.snapshot()?.stats())
    }

    /// 在当前线程上完成一次查询
    pub fn search_blocking(&self, data: &[u8], k: usize) -> Result<SearchOutcome> {
        let corpus = self.snapshot()?;
        let kind = corpus.kind().as_str();
        metrics::inc_query_count(kind);

        let outcome = corpus.search_with(data, k, &self.ranker).inspect_err(|e| {
            metrics::inc_query_failed(kind, e.kind());
        })?;
        metrics::observe_search_duration(kind, outcome.timings.total / 1000.);
        if let Some(top) = outcome.results.first() {
            metrics::observe_top_similarity(kind, top.similarity);
        }
        Ok(outcome)
    }

    /// 在阻塞线程池中完成查询，不阻塞异步运行时
    pub async fn search(self: &Arc<Self>, data: Vec<u8>, k: usize) -> Result<SearchOutcome> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.search_blocking(&data, k))
            .await
            .map_err(|e| Error::Io(io::Error::other(e)))?
    }
}
