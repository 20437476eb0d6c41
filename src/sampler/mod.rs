mod sequence;
#[cfg(feature = "ffmpeg")]
mod video;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, warn};
use walkdir::WalkDir;

pub use self::sequence::*;
#[cfg(feature = "ffmpeg")]
pub use self::video::*;
use crate::error::Result;

/// 默认识别的视频后缀
pub const VIDEO_SUFFIXES: &[&str] = &["mkv", "mp4", "avi", "webm"];
/// 帧目录中识别的图片后缀
pub const FRAME_SUFFIXES: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// 采样得到的一帧
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// 采样序号，从 0 开始
    pub index: u64,
    /// 在视频中的秒数，等于 index / sample_rate
    pub elapsed: f64,
    /// 已缩放到目标宽度的画面
    pub image: DynamicImage,
}

/// 按固定频率产生帧的来源，惰性解码
pub trait FrameSource: Iterator<Item = Result<SampledFrame>> {
    /// 来源文件路径
    fn path(&self) -> &Path;

    /// 回到第一帧重新开始
    fn restart(&mut self) -> Result<()>;
}

/// 打开一个视频文件或帧目录
pub fn open_source(
    path: impl AsRef<Path>,
    sample_rate: f64,
    frame_width: u32,
) -> Result<Box<dyn FrameSource>> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Box::new(SequenceSampler::open(path, sample_rate, frame_width)?));
    }
    open_video(path, sample_rate, frame_width)
}

#[cfg(feature = "ffmpeg")]
fn open_video(path: &Path, sample_rate: f64, frame_width: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(VideoSampler::open(path, sample_rate, frame_width)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video(path: &Path, _sample_rate: f64, _frame_width: u32) -> Result<Box<dyn FrameSource>> {
    Err(crate::error::Error::decode(path, "未启用 ffmpeg 功能，无法解码视频"))
}

/// 从输入路径中找出所有视频文件和帧目录，按路径排序
///
/// 输入路径会先转为绝对路径，同一个来源无论以何种形式给出都得到相同的路径。
/// 输入路径不存在时返回错误，遍历中无法访问的条目会被跳过。
pub fn discover<P: AsRef<Path>>(paths: &[P], suffixes: &[String]) -> Result<Vec<PathBuf>> {
    let mut sources = vec![];
    for root in paths {
        let root = root.as_ref();
        let root = fs::canonicalize(root)
            .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", root.display(), e)))?;
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("无法访问 {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let matched = if entry.file_type().is_dir() {
                is_frame_dir(path)
            } else {
                has_suffix(path, suffixes.iter().map(String::as_str))
            };
            if matched {
                sources.push(path.to_path_buf());
            }
        }
    }
    sources.sort();
    sources.dedup();
    debug!("发现 {} 个来源", sources.len());
    Ok(sources)
}

/// 目录下直接包含图片时视为帧目录
fn is_frame_dir(path: &Path) -> bool {
    let Ok(entries) = path.read_dir() else {
        return false;
    };
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.path().is_file() && has_suffix(&e.path(), FRAME_SUFFIXES.iter().copied()))
}

pub(crate) fn has_suffix<'a>(path: &Path, mut suffixes: impl Iterator<Item = &'a str>) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy();
    suffixes.any(|s| s.eq_ignore_ascii_case(&ext))
}
