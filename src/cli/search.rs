use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat, SearchOptions};
use crate::corpus::SearchOutcome;
use crate::engine::Engine;
use crate::metrics;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub search: SearchOptions,
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// 搜索结束后在标准错误中输出 prometheus 指标
    #[arg(long)]
    pub metrics: bool,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let data = tokio::fs::read(&self.image)
            .await
            .with_context(|| format!("读取图片失败: {}", self.image.display()))?;

        let engine = Arc::new(Engine::new(self.search.ranker()));
        block_in_place(|| {
            engine.reload(
                opts.conf_dir.index(),
                opts.conf_dir.metadata(),
                self.search.load_options(),
            )
        })?;

        let outcome = engine.search(data, self.search.k).await?;
        debug!("提取指纹: {:.2}ms", outcome.timings.extract);
        debug!("搜索      : {:.2}ms", outcome.timings.search);
        debug!("排序      : {:.2}ms", outcome.timings.rank);
        debug!("总计      : {:.2}ms", outcome.timings.total);

        print_result(&outcome, self.output_format)?;
        if self.metrics {
            eprint!("{}", metrics::render());
        }
        Ok(())
    }
}

fn print_result(outcome: &SearchOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(outcome)?)
        }
        OutputFormat::Table => {
            for r in &outcome.results {
                println!(
                    "{}\t{:.2}\t{} S{:02}E{:02}\t{}\t{}",
                    r.rank,
                    r.similarity,
                    r.record.title,
                    r.record.season,
                    r.record.episode,
                    r.timecode,
                    r.record.source
                );
            }
        }
    }
    Ok(())
}
