use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 依次尝试的文件名格式：(正则, 是否包含季数)
static FILENAME_PATTERNS: LazyLock<Vec<(Regex, bool)>> = LazyLock::new(|| {
    [
        // Title S01E02
        (r"^(?P<anime>.+?)[\s_.-]*[Ss](?P<season>\d+)[\s_.-]*[Ee](?P<episode>\d+)", true),
        // Title 1x02
        (r"^(?P<anime>.+?)[\s_-]*(?P<season>\d+)x(?P<episode>\d+)", true),
        // Title [1.02] / Title 1 02
        (r"^(?P<anime>.+?)[\s_]*[\[(]?(?P<season>\d+)[.\s](?P<episode>\d+)[)\]]?", true),
        // [Group] Title - 02
        (r"^\[.*?\]\s*(?P<anime>.+?)\s*-\s*(?P<episode>\d+)", false),
    ]
    .into_iter()
    .map(|(re, season)| (Regex::new(re).expect("failed to build regex"), season))
    .collect()
});

static RE_SEASON_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Ss](?:eason)?\s*(\d+)").expect("failed to build regex"));
static RE_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[Ee](?:pisode|p)?[\s._-]*(\d+)").expect("failed to build regex")
});
static RE_GROUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[[^\]]*\]\s*)+").expect("failed to build regex"));

/// 一集番剧的身份信息
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId {
    /// 番剧标识
    pub anime_id: String,
    /// 显示用标题
    pub title: String,
    pub season: u32,
    pub episode: u32,
}

impl EpisodeId {
    pub fn new(title: impl Into<String>, season: u32, episode: u32) -> Self {
        let title = title.into();
        Self { anime_id: slugify(&title), title, season, episode }
    }
}

/// 外部目录文件中的一项
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub anime_id: Option<String>,
    pub title: String,
    #[serde(default = "default_season")]
    pub season: u32,
    pub episode: u32,
}

fn default_season() -> u32 {
    1
}

/// 番剧信息解析器，优先使用外部目录文件，否则从路径中解析
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// 从 JSON 文件加载目录，键为视频文件名
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let entries = serde_json::from_slice(&data)
            .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 解析视频文件对应的番剧、季数和集数
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<EpisodeId> {
        let path = path.as_ref();
        let file_name = path.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();

        if let Some(entry) = self.entries.get(&*file_name) {
            debug!("使用目录文件中的信息: {}", file_name);
            let anime_id = entry.anime_id.clone().unwrap_or_else(|| slugify(&entry.title));
            return Ok(EpisodeId {
                anime_id,
                title: entry.title.clone(),
                season: entry.season,
                episode: entry.episode,
            });
        }

        parse_path(path)
    }
}

/// 从路径解析番剧信息，先匹配文件名，再尝试 `番剧/Season N/EpM` 的目录结构
///
/// 帧目录使用完整的目录名，视频文件去掉后缀。
pub fn parse_path(path: impl AsRef<Path>) -> Result<EpisodeId> {
    let path = path.as_ref();
    let name = match path.is_dir() {
        true => path.file_name(),
        false => path.file_stem(),
    };
    let stem = name.map(|s| s.to_string_lossy()).unwrap_or_default();

    if let Some(id) = parse_file_stem(&stem) {
        return Ok(id);
    }

    let season_dir = path.parent();
    let anime_dir = season_dir.and_then(|p| p.parent());
    if let (Some(season_dir), Some(anime_dir)) = (season_dir, anime_dir) {
        let anime = anime_dir.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
        let season_name = season_dir.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
        let season = RE_SEASON_DIR
            .captures(&season_name)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(1);
        let episode = RE_EPISODE.captures(&stem).and_then(|c| c[1].parse().ok());
        if let Some(episode) = episode {
            if !anime.is_empty() {
                return Ok(EpisodeId::new(clean_title(&anime), season, episode));
            }
        }
    }

    Err(Error::Catalog(path.display().to_string()))
}

fn parse_file_stem(stem: &str) -> Option<EpisodeId> {
    for (re, has_season) in FILENAME_PATTERNS.iter() {
        let Some(captures) = re.captures(stem) else {
            continue;
        };
        let title = clean_title(&captures["anime"]);
        if title.is_empty() {
            continue;
        }
        let season = match has_season {
            true => captures["season"].parse().ok()?,
            false => 1,
        };
        let episode = captures["episode"].parse().ok()?;
        return Some(EpisodeId::new(title, season, episode));
    }
    None
}

fn clean_title(s: &str) -> String {
    let s = RE_GROUP_TAG.replace(s, "");
    s.replace('_', " ").trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '.').to_owned()
}

/// 将标题转换为由小写字母、数字和 `-` 组成的标识
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        // 非 ASCII 标题退化为哈希
        slug = blake3::hash(title.as_bytes()).to_hex()[..16].to_string();
    }
    slug
}
