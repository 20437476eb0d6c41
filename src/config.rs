use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::corpus::LoadOptions;
use crate::index::{HnswParams, IndexKind};
use crate::ranker::{Ranker, Similarity};

fn default_conf_dir() -> ConfDir {
    match ProjectDirs::from("", "anisearch", "anisearch") {
        Some(dirs) => ConfDir::new(dirs.data_dir()),
        None => ConfDir::new(".anisearch"),
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SampleOptions {
    /// 每秒采样帧数
    #[arg(short = 'r', long, value_name = "FPS", default_value_t = 6.)]
    pub sample_rate: f64,
    /// 采样帧缩放后的宽度，高度按比例缩放
    #[arg(short = 'w', long, value_name = "WIDTH", default_value_t = 512)]
    pub frame_width: u32,
    /// 并行处理的线程数量，默认为 CPU 核数
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,
    /// 扫描的视频后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "mkv,mp4,avi,webm")]
    pub suffix: String,
    /// 番剧信息目录文件，默认使用配置目录下的 catalog.json
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,
}

impl SampleOptions {
    pub fn suffixes(&self) -> Vec<String> {
        self.suffix.split(',').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect()
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 返回的结果数量
    #[arg(short, value_name = "K", default_value_t = 10)]
    pub k: usize,
    /// 使用的索引结构
    #[arg(long, value_enum, default_value_t = IndexKind::Flat)]
    pub index: IndexKind,
    /// HNSW 搜索时的候选列表大小
    #[arg(long, value_name = "N", default_value_t = 64)]
    pub ef_search: usize,
    /// 同一集中两个结果的最小间隔（秒）
    #[arg(long, value_name = "SECONDS", default_value_t = 5.)]
    pub min_separation: f64,
    /// 允许的最大汉明距离，范围从 0 到 192
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(0..=192))]
    pub max_distance: Option<u32>,
    /// 相似度计算方式
    #[arg(long, value_enum, default_value_t = SimilarityType::Linear)]
    pub similarity: SimilarityType,
    /// 线性相似度中相似度降为 0 的距离
    #[arg(long, value_name = "N", default_value_t = 192.)]
    pub scale: f64,
    /// 指数相似度中相似度减半的距离
    #[arg(long, value_name = "N", default_value_t = 24.)]
    pub half_distance: f64,
}

impl SearchOptions {
    pub fn ranker(&self) -> Ranker {
        let similarity = match self.similarity {
            SimilarityType::Linear => Similarity::Linear { scale: self.scale },
            SimilarityType::Exponential => Similarity::Exponential { half_distance: self.half_distance },
        };
        Ranker::new(similarity, self.min_separation, self.max_distance)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            kind: self.index,
            hnsw: HnswParams { ef_search: self.ef_search, ..Default::default() },
            schema: None,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum SimilarityType {
    /// 随距离线性下降
    Linear,
    /// 随距离指数下降
    Exponential,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "anisearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 索引文件所在目录
    #[arg(short, long, default_value_t = default_conf_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从视频或帧目录构建索引
    Build(BuildCommand),
    /// 搜索图片所在的番剧和时间
    Search(SearchCommand),
    /// 显示索引信息
    Stats(StatsCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("index.bin")
    }

    /// 返回元数据文件的路径
    pub fn metadata(&self) -> PathBuf {
        self.path.join("metadata.bin")
    }

    /// 返回番剧信息目录文件的路径
    pub fn catalog(&self) -> PathBuf {
        self.path.join("catalog.json")
    }
}

impl fmt::Display for ConfDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
