use std::io;
use std::path::Path;

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::artifact::{self, Artifacts, Schema};
use crate::catalog::{Catalog, EpisodeId};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, fingerprint_image};
use crate::index::FingerprintIndex;
use crate::metadata::{FrameRecord, MetadataTable};
use crate::sampler::{self, VIDEO_SUFFIXES};
use crate::utils::pb_style;

/// 单个来源计算出的所有帧
struct SourceFrames {
    id: EpisodeId,
    frames: Vec<(f64, Fingerprint)>,
}

/// 一次构建的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// 构建前已有的指纹数量
    pub existing: usize,
    /// 本次新增的来源数量
    pub added_sources: usize,
    /// 已经收录而跳过的来源数量
    pub unchanged_sources: usize,
    /// 处理失败而跳过的来源数量
    pub failed_sources: usize,
    /// 本次新增的指纹数量
    pub added_frames: usize,
}

/// 从视频或帧目录构建指纹索引和元数据
#[derive(Debug, Clone)]
pub struct CorpusBuilder {
    sample_rate: f64,
    frame_width: u32,
    threads: usize,
    incremental: bool,
    suffixes: Vec<String>,
    catalog: Catalog,
}

impl Default for CorpusBuilder {
    fn default() -> Self {
        Self {
            sample_rate: 6.,
            frame_width: 512,
            threads: num_cpus::get(),
            incremental: true,
            suffixes: VIDEO_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            catalog: Catalog::default(),
        }
    }
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每秒采样帧数
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// 采样帧缩放后的宽度
    pub fn frame_width(mut self, frame_width: u32) -> Self {
        self.frame_width = frame_width;
        self
    }

    /// 并行处理的线程数量
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// 已有索引时是否在其基础上追加
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// 识别为视频的文件后缀
    pub fn suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.suffixes = suffixes;
        self
    }

    /// 优先于文件名解析的目录文件
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.sample_rate, self.frame_width)
    }

    /// 从头构建索引
    pub fn build_index<P: AsRef<Path>>(&self, paths: &[P]) -> Result<(FingerprintIndex, MetadataTable)> {
        let mut index = FingerprintIndex::new();
        let mut metadata = MetadataTable::new();
        self.extend(&mut index, &mut metadata, paths)?;
        Ok((index, metadata))
    }

    /// 在已有索引后追加新的来源，已经收录的来源会被跳过
    pub fn extend<P: AsRef<Path>>(
        &self,
        index: &mut FingerprintIndex,
        metadata: &mut MetadataTable,
        paths: &[P],
    ) -> Result<BuildSummary> {
        self.check()?;
        if index.len() != metadata.len() {
            return Err(Error::integrity(format!(
                "索引数量 {} 与元数据数量 {} 不一致",
                index.len(),
                metadata.len()
            )));
        }

        let mut summary = BuildSummary { existing: index.len(), ..Default::default() };
        let sources = {
            let known = metadata.sources();
            let (known, new): (Vec<_>, Vec<_>) = sampler::discover(paths, &self.suffixes)?
                .into_iter()
                .partition(|p| known.contains(source_name(p).as_str()));
            summary.unchanged_sources = known.len();
            new
        };
        info!("共 {} 个新来源，跳过 {} 个已收录的来源", sources.len(), summary.unchanged_sources);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::Io(io::Error::other(e)))?;

        let pb = ProgressBar::new(sources.len() as u64).with_style(pb_style());
        let results = pool.install(|| {
            sources
                .par_iter()
                .progress_with(pb.clone())
                .map(|path| {
                    let r = self.process_source(path);
                    pb.set_message(path.display().to_string());
                    r
                })
                .collect::<Vec<_>>()
        });
        pb.finish_with_message("采样完成");

        // 按来源路径顺序串行追加，保证位置与元数据一一对应
        for (path, result) in sources.iter().zip(results) {
            match result {
                Ok(source) => {
                    let name = source_name(path);
                    for (elapsed, fingerprint) in &source.frames {
                        let position = index.push(fingerprint);
                        metadata.push(FrameRecord::new(position, &source.id, *elapsed, &name))?;
                    }
                    info!(
                        "{} S{:02}E{:02}: {} 帧 ({})",
                        source.id.title,
                        source.id.season,
                        source.id.episode,
                        source.frames.len(),
                        name
                    );
                    summary.added_sources += 1;
                    summary.added_frames += source.frames.len();
                }
                Err(e) if e.is_recoverable() => {
                    warn!("跳过 {}: {}", path.display(), e);
                    summary.failed_sources += 1;
                }
                Err(e) => {
                    error!("处理 {} 失败: {}", path.display(), e);
                    summary.failed_sources += 1;
                }
            }
        }
        Ok(summary)
    }

    /// 构建并写入磁盘
    ///
    /// 增量模式下如果已有索引，会在其基础上追加，
    /// 此时构建参数必须与已有索引一致。
    pub fn build_into<P: AsRef<Path>>(
        &self,
        index_path: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
        paths: &[P],
    ) -> Result<BuildSummary> {
        let (index_path, metadata_path) = (index_path.as_ref(), metadata_path.as_ref());
        let (mut index, mut metadata) =
            if self.incremental && index_path.exists() && metadata_path.exists() {
                let Artifacts { index, metadata, .. } =
                    artifact::load(index_path, metadata_path, Some(self.schema()))?;
                info!("在已有的 {} 条指纹后追加", index.len());
                (index, metadata)
            } else {
                (FingerprintIndex::new(), MetadataTable::new())
            };

        let summary = self.extend(&mut index, &mut metadata, paths)?;
        if summary.added_frames == 0 {
            // 已有的索引文件保持不变
            if summary.failed_sources > 0 {
                return Err(Error::NoSource(format!("{} 个来源全部处理失败", summary.failed_sources)));
            }
            if summary.unchanged_sources == 0 {
                return Err(Error::NoSource("输入路径中没有找到视频或帧目录".to_string()));
            }
            info!("没有新的指纹，索引保持不变");
            return Ok(summary);
        }
        self.persist(index_path, metadata_path, &index, &metadata)?;
        Ok(summary)
    }

    pub fn persist(
        &self,
        index_path: impl AsRef<Path>,
        metadata_path: impl AsRef<Path>,
        index: &FingerprintIndex,
        metadata: &MetadataTable,
    ) -> Result<()> {
        artifact::save(index_path, metadata_path, self.schema(), index, metadata)
    }

    fn check(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.) {
            return Err(Error::integrity(format!("无效的采样频率: {}", self.sample_rate)));
        }
        if self.frame_width == 0 {
            return Err(Error::integrity("帧宽度不能为 0"));
        }
        Ok(())
    }

    fn process_source(&self, path: &Path) -> Result<SourceFrames> {
        let id = self.catalog.resolve(path)?;
        let source = sampler::open_source(path, self.sample_rate, self.frame_width)?;
        let frames = source
            .map(|frame| {
                let frame = frame?;
                let fingerprint =
                    fingerprint_image(&frame.image).map_err(|e| Error::decode(path, e))?;
                Ok((frame.elapsed, fingerprint))
            })
            .collect::<Result<Vec<_>>>()?;
        if frames.is_empty() {
            return Err(Error::decode(path, "没有解码出任何帧"));
        }
        Ok(SourceFrames { id, frames })
    }
}

/// 以默认选项从头构建索引
pub fn build_index<P: AsRef<Path>>(
    paths: &[P],
    sample_rate: f64,
    frame_width: u32,
) -> Result<(FingerprintIndex, MetadataTable)> {
    CorpusBuilder::new().sample_rate(sample_rate).frame_width(frame_width).build_index(paths)
}

fn source_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use image::{DynamicImage, GrayImage};
    use tempfile::TempDir;

    use super::*;

    fn write_episode(root: &Path, name: &str, frames: u32, seed: u32) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..frames {
            let img = GrayImage::from_fn(64, 64, |x, y| {
                let v = (x / 8 * 31 + y / 8 * 17 + i * 53 + seed * 101) % 256;
                image::Luma([v as u8])
            });
            DynamicImage::ImageLuma8(img).save(dir.join(format!("{:04}.png", i))).unwrap();
        }
        dir
    }

    #[test]
    fn test_build_alignment() {
        let dir = TempDir::new().unwrap();
        write_episode(dir.path(), "Show S01E02", 3, 1);
        write_episode(dir.path(), "Show S01E01", 2, 2);

        let (index, metadata) = build_index(&[dir.path()], 2., 64).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(metadata.len(), 5);
        metadata.validate_positions().unwrap();

        // 来源按路径排序，E01 在前
        let episodes = metadata.iter().map(|r| (r.episode, r.elapsed)).collect::<Vec<_>>();
        assert_eq!(episodes, vec![(1, 0.), (1, 0.5), (2, 0.), (2, 0.5), (2, 1.)]);
    }

    #[test]
    fn test_failed_source_skipped() {
        let dir = TempDir::new().unwrap();
        write_episode(dir.path(), "Show S01E01", 2, 1);
        let broken = dir.path().join("Show S01E02");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("0000.png"), b"broken").unwrap();
        // 无法解析番剧信息的目录
        write_episode(dir.path(), "random", 1, 3);

        let builder = CorpusBuilder::new().frame_width(64).threads(2);
        let mut index = FingerprintIndex::new();
        let mut metadata = MetadataTable::new();
        let summary = builder.extend(&mut index, &mut metadata, &[dir.path()]).unwrap();
        assert_eq!(summary.added_sources, 1);
        assert_eq!(summary.failed_sources, 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_incremental_build() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let (ip, mp) = (dir.path().join("index.bin"), dir.path().join("metadata.bin"));
        write_episode(&data, "Show S01E01", 2, 1);

        let builder = CorpusBuilder::new().frame_width(64);
        let summary = builder.build_into(&ip, &mp, &[&data]).unwrap();
        assert_eq!(summary.added_frames, 2);

        write_episode(&data, "Show S01E02", 3, 2);
        let summary = builder.build_into(&ip, &mp, &[&data]).unwrap();
        assert_eq!(summary, BuildSummary {
            existing: 2,
            added_sources: 1,
            unchanged_sources: 1,
            failed_sources: 0,
            added_frames: 3,
        });

        let loaded = artifact::load(&ip, &mp, Some(builder.schema())).unwrap();
        assert_eq!(loaded.index.len(), 5);
        assert_eq!(loaded.metadata.get(2).unwrap().episode, 2);
        assert_eq!(loaded.metadata.get(2).unwrap().position, 2);
    }

    #[test]
    fn test_incremental_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let (ip, mp) = (dir.path().join("index.bin"), dir.path().join("metadata.bin"));
        write_episode(&data, "Show S01E01", 1, 1);
        CorpusBuilder::new().frame_width(64).build_into(&ip, &mp, &[&data]).unwrap();

        let r = CorpusBuilder::new().frame_width(128).build_into(&ip, &mp, &[&data]);
        assert!(matches!(r, Err(Error::Integrity(_))));
        // 非增量模式下直接重建
        let summary =
            CorpusBuilder::new().frame_width(128).incremental(false).build_into(&ip, &mp, &[&data]);
        assert_eq!(summary.unwrap().added_frames, 1);
    }

    #[test]
    fn test_rebuild_keeps_index_on_bad_input() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let (ip, mp) = (dir.path().join("index.bin"), dir.path().join("metadata.bin"));
        write_episode(&data, "Show S01E01", 3, 1);
        let builder = CorpusBuilder::new().frame_width(64);
        builder.build_into(&ip, &mp, &[&data]).unwrap();

        // 输入路径写错
        let rebuild = builder.clone().incremental(false);
        let r = rebuild.build_into(&ip, &mp, &[dir.path().join("dta")]);
        assert!(matches!(r, Err(Error::Io(_))));

        // 所有来源都处理失败
        let broken = dir.path().join("broken");
        fs::create_dir_all(broken.join("Show S01E02")).unwrap();
        fs::write(broken.join("Show S01E02/0000.png"), b"broken").unwrap();
        let r = rebuild.build_into(&ip, &mp, &[&broken]);
        assert!(matches!(r, Err(Error::NoSource(_))));

        // 没有任何来源
        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        let r = rebuild.build_into(&ip, &mp, &[&empty]);
        assert!(matches!(r, Err(Error::NoSource(_))));

        let loaded = artifact::load(&ip, &mp, Some(builder.schema())).unwrap();
        assert_eq!(loaded.index.len(), 3);
    }

    #[test]
    fn test_same_source_different_spelling() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        let (ip, mp) = (dir.path().join("index.bin"), dir.path().join("metadata.bin"));
        write_episode(&data, "Show S01E01", 2, 1);
        let builder = CorpusBuilder::new().frame_width(64);
        builder.build_into(&ip, &mp, &[&data]).unwrap();

        let summary = builder.build_into(&ip, &mp, &[data.join(".")]).unwrap();
        assert_eq!((summary.unchanged_sources, summary.added_frames), (1, 0));
        let loaded = artifact::load(&ip, &mp, None).unwrap();
        assert_eq!(loaded.index.len(), 2);
    }

    #[test]
    fn test_invalid_sample_rate() {
        let r = build_index(&[Path::new(".")], 0., 64);
        assert!(matches!(r, Err(Error::Integrity(_))));
    }
}
