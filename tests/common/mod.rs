#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use rand::prelude::*;

/// 每行每列的色块数量
const CELLS: u32 = 8;
/// 色块边长
const CELL: u32 = 16;
/// 生成的帧宽度，构建时使用相同宽度以跳过缩放
pub const FRAME_WIDTH: u32 = CELLS * CELL;

/// 由随机灰度色块组成的画面
pub fn random_cells(seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..CELLS * CELLS).map(|_| rng.random()).collect()
}

pub fn frame_from_cells(cells: &[u8]) -> DynamicImage {
    let img = GrayImage::from_fn(FRAME_WIDTH, FRAME_WIDTH, |x, y| {
        Luma([cells[(y / CELL * CELLS + x / CELL) as usize]])
    });
    DynamicImage::ImageLuma8(img)
}

/// 三帧测试画面：B 只修改了 A 左上角的一个色块，C 与 A 无关
pub fn frames_abc() -> (DynamicImage, DynamicImage, DynamicImage) {
    let mut a = random_cells(1);
    a[0] = 255;
    let mut b = a.clone();
    b[0] = 0;
    let c = random_cells(99);
    (frame_from_cells(&a), frame_from_cells(&b), frame_from_cells(&c))
}

pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(vec![]);
    img.write_to(&mut buf, ImageFormat::Png).expect("failed to encode png");
    buf.into_inner()
}

/// 将画面按顺序写入帧目录
pub fn write_episode(root: &Path, name: &str, frames: &[&DynamicImage]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("failed to create episode dir");
    for (i, frame) in frames.iter().enumerate() {
        frame.save(dir.join(format!("{:04}.png", i))).expect("failed to save frame");
    }
    dir
}

/// A、B、C 分别位于不同的集中
pub fn write_abc_corpus(root: &Path) {
    let (a, b, c) = frames_abc();
    write_episode(root, "Show S01E01", &[&a]);
    write_episode(root, "Show S01E02", &[&b]);
    write_episode(root, "Other Show S01E01", &[&c]);
}
