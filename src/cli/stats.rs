use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};
use crate::corpus::SearchableCorpus;

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for StatsCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let corpus = block_in_place(|| {
            SearchableCorpus::load(opts.conf_dir.index(), opts.conf_dir.metadata())
        })?;
        let stats = corpus.stats();

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Table => {
                println!("index_size      : {}", stats.index_size);
                println!("metadata_entries: {}", stats.metadata_entries);
                println!("code_bits       : {}", stats.schema.code_bits);
                println!("sample_rate     : {}", stats.schema.sample_rate);
                println!("frame_width     : {}", stats.schema.frame_width);
            }
        }
        Ok(())
    }
}
