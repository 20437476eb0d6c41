use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hamming::CODE_BITS;
use crate::index::FingerprintIndex;
use crate::metadata::{FrameRecord, MetadataTable};

const MAGIC: [u8; 8] = *b"ANISRCH\0";
const FORMAT_VERSION: u32 = 1;

/// 构建时的参数，查询时必须与构建时完全一致
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// 指纹位数
    pub code_bits: u32,
    /// 每秒采样帧数
    pub sample_rate: f64,
    /// 采样帧缩放后的宽度
    pub frame_width: u32,
}

impl Schema {
    pub fn new(sample_rate: f64, frame_width: u32) -> Self {
        Self { code_bits: CODE_BITS, sample_rate, frame_width }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ArtifactKind {
    Index,
    Metadata,
}

/// 索引文件和元数据文件共用的文件头
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactHeader {
    magic: [u8; 8],
    version: u32,
    kind: ArtifactKind,
    schema: Schema,
    /// 条目数量
    count: u64,
    /// 索引数据的 blake3 摘要，两个文件必须一致
    build_id: [u8; 32],
}

impl ArtifactHeader {
    fn new(kind: ArtifactKind, schema: Schema, count: usize, build_id: [u8; 32]) -> Self {
        Self { magic: MAGIC, version: FORMAT_VERSION, kind, schema, count: count as u64, build_id }
    }

    fn check(&self, kind: ArtifactKind, path: &Path) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::integrity(format!("{} 不是索引文件", path.display())));
        }
        if self.version != FORMAT_VERSION {
            return Err(Error::integrity(format!(
                "{} 的格式版本为 {}，当前版本为 {}",
                path.display(),
                self.version,
                FORMAT_VERSION
            )));
        }
        if self.kind != kind {
            return Err(Error::integrity(format!("{} 的文件类型不正确", path.display())));
        }
        Ok(())
    }
}

/// 从磁盘加载的一对索引和元数据
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub schema: Schema,
    pub index: FingerprintIndex,
    pub metadata: MetadataTable,
}

/// 将索引和元数据写入磁盘
///
/// 两个文件先写入临时文件，全部写完后再依次替换。
/// 替换前旧文件会保留为 `.bak`，两次替换之间中断时 [`load`] 会退回到旧文件。
pub fn save(
    index_path: impl AsRef<Path>,
    metadata_path: impl AsRef<Path>,
    schema: Schema,
    index: &FingerprintIndex,
    metadata: &MetadataTable,
) -> Result<()> {
    let (index_path, metadata_path) = (index_path.as_ref(), metadata_path.as_ref());
    stage(index_path, metadata_path, schema, index, metadata)?;
    backup(index_path, metadata_path)?;
    commit(index_path, metadata_path)?;
    info!("已保存 {} 条指纹: {}", index.len(), index_path.display());
    Ok(())
}

/// 写入两个临时文件
fn stage(
    index_path: &Path,
    metadata_path: &Path,
    schema: Schema,
    index: &FingerprintIndex,
    metadata: &MetadataTable,
) -> Result<()> {
    if index.len() != metadata.len() {
        return Err(Error::integrity(format!(
            "索引数量 {} 与元数据数量 {} 不一致",
            index.len(),
            metadata.len()
        )));
    }
    let build_id = index.digest();

    let header = ArtifactHeader::new(ArtifactKind::Index, schema, index.len(), build_id);
    write_file(&tmp_path(index_path), |w| {
        bincode::serialize_into(&mut *w, &header)?;
        w.write_all(index.as_bytes())?;
        Ok(())
    })?;

    let header = ArtifactHeader::new(ArtifactKind::Metadata, schema, metadata.len(), build_id);
    write_file(&tmp_path(metadata_path), |w| {
        bincode::serialize_into(&mut *w, &header)?;
        let records = metadata.iter().collect::<Vec<_>>();
        bincode::serialize_into(&mut *w, &records)?;
        Ok(())
    })?;
    Ok(())
}

/// 将当前配对的文件保留为 `.bak`
///
/// 当前文件不配对时说明上一次替换被中断，此时已有的 `.bak` 才是最后一份完整的结果，保持不动。
fn backup(index_path: &Path, metadata_path: &Path) -> Result<()> {
    if !is_paired(index_path, metadata_path) {
        return Ok(());
    }
    for path in [index_path, metadata_path] {
        let bak = bak_path(path);
        remove_if_exists(&bak)?;
        if fs::hard_link(path, &bak).is_err() {
            fs::copy(path, &bak)?;
        }
    }
    Ok(())
}

/// 依次替换元数据和索引，完成后删除 `.bak`
fn commit(index_path: &Path, metadata_path: &Path) -> Result<()> {
    fs::rename(tmp_path(metadata_path), metadata_path)?;
    fs::rename(tmp_path(index_path), index_path)?;
    remove_if_exists(&bak_path(index_path))?;
    remove_if_exists(&bak_path(metadata_path))?;
    Ok(())
}

/// 加载索引和元数据，并校验两者是否配对
///
/// 如果指定了 `expected`，还会校验构建参数是否一致。
/// 两个文件不配对且存在 `.bak` 时，加载上一次完整保存的结果。
pub fn load(
    index_path: impl AsRef<Path>,
    metadata_path: impl AsRef<Path>,
    expected: Option<Schema>,
) -> Result<Artifacts> {
    let (index_path, metadata_path) = (index_path.as_ref(), metadata_path.as_ref());
    let err = match load_pair(index_path, metadata_path, expected) {
        Err(e @ Error::Integrity(_)) => e,
        r => return r,
    };

    let (index_bak, metadata_bak) = (bak_path(index_path), bak_path(metadata_path));
    if !(index_bak.exists() && metadata_bak.exists()) {
        return Err(err);
    }
    warn!("{}，尝试加载上一次保存的结果", err);
    load_pair(&index_bak, &metadata_bak, expected).map_err(|_| err)
}

fn load_pair(index_path: &Path, metadata_path: &Path, expected: Option<Schema>) -> Result<Artifacts> {
    debug!("读取索引: {}", index_path.display());
    let mut reader = BufReader::new(File::open(index_path)?);
    let index_header = read_header(&mut reader, ArtifactKind::Index, index_path)?;
    let mut data = vec![];
    reader.read_to_end(&mut data)?;
    let index = FingerprintIndex::from_bytes(&data)?;

    debug!("读取元数据: {}", metadata_path.display());
    let mut reader = BufReader::new(File::open(metadata_path)?);
    let metadata_header = read_header(&mut reader, ArtifactKind::Metadata, metadata_path)?;
    let records: Vec<FrameRecord> = bincode::deserialize_from(&mut reader)?;
    let metadata = MetadataTable::from_records(records);

    if index_header.count != index.len() as u64 {
        return Err(Error::integrity(format!(
            "索引文件头记录 {} 条，实际为 {} 条",
            index_header.count,
            index.len()
        )));
    }
    if metadata_header.count != metadata.len() as u64 {
        return Err(Error::integrity(format!(
            "元数据文件头记录 {} 条，实际为 {} 条",
            metadata_header.count,
            metadata.len()
        )));
    }
    if index.len() != metadata.len() {
        return Err(Error::integrity(format!(
            "索引数量 {} 与元数据数量 {} 不一致",
            index.len(),
            metadata.len()
        )));
    }
    if index_header.schema != metadata_header.schema {
        return Err(Error::integrity("索引与元数据的构建参数不一致"));
    }
    if index_header.build_id != metadata_header.build_id || index.digest() != index_header.build_id
    {
        return Err(Error::integrity("索引与元数据不是同一次构建的结果"));
    }
    if let Some(expected) = expected {
        if expected != index_header.schema {
            return Err(Error::integrity(format!(
                "构建参数 {:?} 与期望的 {:?} 不一致",
                index_header.schema, expected
            )));
        }
    }
    metadata.validate_positions()?;

    Ok(Artifacts { schema: index_header.schema, index, metadata })
}

/// 读取并校验文件头，指纹位数必须与当前版本一致
fn read_header<R: Read>(reader: &mut R, kind: ArtifactKind, path: &Path) -> Result<ArtifactHeader> {
    let header: ArtifactHeader = bincode::deserialize_from(reader)?;
    header.check(kind, path)?;
    if header.schema.code_bits != CODE_BITS {
        return Err(Error::integrity(format!(
            "{} 的指纹为 {} 位，当前为 {} 位",
            path.display(),
            header.schema.code_bits,
            CODE_BITS
        )));
    }
    Ok(header)
}

/// 只读取文件头，判断两个文件是否属于同一次构建
fn is_paired(index_path: &Path, metadata_path: &Path) -> bool {
    let header = |path: &Path, kind| -> Result<ArtifactHeader> {
        let mut reader = BufReader::new(File::open(path)?);
        read_header(&mut reader, kind, path)
    };
    match (header(index_path, ArtifactKind::Index), header(metadata_path, ArtifactKind::Metadata)) {
        (Ok(i), Ok(m)) => i.build_id == m.build_id && i.schema == m.schema && i.count == m.count,
        _ => false,
    }
}

/// 在原路径后追加 `.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// 在原路径后追加 `.bak`
pub fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn write_file<F>(path: &Path, f: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    f(&mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
