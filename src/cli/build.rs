use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::task::block_in_place;

use crate::builder::CorpusBuilder;
use crate::catalog::Catalog;
use crate::cli::SubCommandExtend;
use crate::config::{Opts, SampleOptions};

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub sample: SampleOptions,
    /// 视频文件或帧目录，目录会被递归扫描
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// 忽略已有的索引，从头重新构建
    #[arg(long)]
    pub rebuild: bool,
}

impl SubCommandExtend for BuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let catalog_path = match &self.sample.catalog {
            Some(path) => Some(path.clone()),
            None => Some(opts.conf_dir.catalog()).filter(|p| p.exists()),
        };
        let catalog = match catalog_path {
            Some(path) => {
                let catalog = Catalog::load(&path)
                    .with_context(|| format!("加载目录文件失败: {}", path.display()))?;
                info!("已加载 {} 条番剧信息: {}", catalog.len(), path.display());
                catalog
            }
            None => Catalog::default(),
        };

        let mut builder = CorpusBuilder::new()
            .sample_rate(self.sample.sample_rate)
            .frame_width(self.sample.frame_width)
            .suffixes(self.sample.suffixes())
            .incremental(!self.rebuild)
            .catalog(catalog);
        if let Some(threads) = self.sample.threads {
            builder = builder.threads(threads);
        }

        let conf_dir = &opts.conf_dir;
        let summary = block_in_place(|| {
            builder.build_into(conf_dir.index(), conf_dir.metadata(), &self.paths)
        })?;

        info!(
            "构建完成: 新增 {} 个来源 {} 帧，跳过 {} 个已收录来源，{} 个来源失败",
            summary.added_sources,
            summary.added_frames,
            summary.unchanged_sources,
            summary.failed_sources
        );
        println!("{}", serde_json::to_string(&summary)?);
        Ok(())
    }
}
