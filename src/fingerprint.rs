use std::fmt;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hamming::{CODE_SIZE, Code, hamming};

const HASH_SIZE: u32 = 8;
// 缩放滤波器属于指纹格式的一部分，修改后必须重建索引
const FILTER: FilterType = FilterType::Triangle;

thread_local! {
    static HASHERS: Hashers = Hashers::new();
}

/// 组成指纹的三个哈希器
struct Hashers {
    phash: Hasher,
    dhash: Hasher,
    ahash: Hasher,
}

impl Hashers {
    fn new() -> Self {
        let config = || HasherConfig::new().hash_size(HASH_SIZE, HASH_SIZE).resize_filter(FILTER);
        Self {
            phash: config().hash_alg(HashAlg::Median).preproc_dct().to_hasher(),
            dhash: config().hash_alg(HashAlg::Gradient).to_hasher(),
            ahash: config().hash_alg(HashAlg::Mean).to_hasher(),
        }
    }
}

/// 一帧画面的感知指纹，由 pHash、dHash、aHash 依次拼接而成
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub Code);

impl Fingerprint {
    pub fn as_bytes(&self) -> &Code {
        &self.0
    }

    pub fn distance(&self, other: &Fingerprint) -> u32 {
        hamming(&self.0, &other.0)
    }

    pub fn phash(&self) -> u64 {
        self.part(0)
    }

    pub fn dhash(&self) -> u64 {
        self.part(1)
    }

    pub fn ahash(&self) -> u64 {
        self.part(2)
    }

    fn part(&self, i: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[i * 8..i * 8 + 8]);
        u64::from_be_bytes(buf)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x}:{:016x}:{:016x})", self.phash(), self.dhash(), self.ahash())
    }
}

/// 从原始图片字节计算指纹
pub fn fingerprint_bytes(data: &[u8]) -> Result<Fingerprint> {
    if data.is_empty() {
        return Err(Error::UnsupportedFormat("空文件".to_string()));
    }
    let img = image::load_from_memory(data).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
    fingerprint_image(&img)
}

/// 计算图片的指纹，结果只取决于像素内容
pub fn fingerprint_image(img: &DynamicImage) -> Result<Fingerprint> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(Error::UnsupportedFormat(format!("图片尺寸为 {}x{}", width, height)));
    }

    let mut code = [0u8; CODE_SIZE];
    HASHERS.with(|h| {
        for (slot, hasher) in code.chunks_exact_mut(8).zip([&h.phash, &h.dhash, &h.ahash]) {
            slot.copy_from_slice(hasher.hash_image(img).as_bytes());
        }
    });
    Ok(Fingerprint(code))
}

/// 将图片等比缩放到指定宽度，宽度一致时原样返回
pub fn normalize_width(img: DynamicImage, width: u32) -> DynamicImage {
    if width == 0 || img.width() == width || img.height() == 0 {
        return img;
    }
    let height = ((img.height() as u64 * width as u64) / img.width() as u64).max(1) as u32;
    img.resize_exact(width, height, FILTER)
}
