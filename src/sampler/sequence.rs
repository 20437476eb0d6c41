use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fingerprint::normalize_width;
use crate::sampler::{FRAME_SUFFIXES, FrameSource, SampledFrame, has_suffix};

/// 已经按固定频率导出的帧目录，按文件名排序读取
pub struct SequenceSampler {
    path: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
    sample_rate: f64,
    frame_width: u32,
}

impl SequenceSampler {
    pub fn open(path: impl AsRef<Path>, sample_rate: f64, frame_width: u32) -> Result<Self> {
        let path = path.as_ref();
        let entries = path.read_dir().map_err(|e| Error::decode(path, e))?;
        let mut frames = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && has_suffix(p, FRAME_SUFFIXES.iter().copied()))
            .collect::<Vec<_>>();
        if frames.is_empty() {
            return Err(Error::decode(path, "目录中没有图片"));
        }
        frames.sort();
        Ok(Self { path: path.to_path_buf(), frames, cursor: 0, sample_rate, frame_width })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Iterator for SequenceSampler {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.frames.get(self.cursor)?;
        let index = self.cursor as u64;
        self.cursor += 1;

        let frame = image::open(file).map_err(|e| Error::decode(file, e)).map(|img| SampledFrame {
            index,
            elapsed: index as f64 / self.sample_rate,
            image: normalize_width(img, self.frame_width),
        });
        Some(frame)
    }
}

impl FrameSource for SequenceSampler {
    fn path(&self) -> &Path {
        &self.path
    }

    fn restart(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};
    use tempfile::TempDir;

    use super::*;

    fn write_frames(dir: &Path, n: usize) {
        for i in 0..n {
            let img = RgbImage::from_fn(64, 36, |x, y| image::Rgb([(x * 4) as u8, (y * 7) as u8, i as u8]));
            DynamicImage::ImageRgb8(img).save(dir.join(format!("{:04}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_sequence_elapsed_and_width() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), 4);
        let sampler = SequenceSampler::open(dir.path(), 2., 128).unwrap();
        let frames = sampler.collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames.iter().map(|f| f.elapsed).collect::<Vec<_>>(), vec![0., 0.5, 1., 1.5]);
        assert_eq!(frames[0].image.width(), 128);
        assert_eq!(frames[0].image.height(), 72);
    }

    #[test]
    fn test_sequence_restart() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), 2);
        let mut sampler = SequenceSampler::open(dir.path(), 6., 64).unwrap();
        assert_eq!(sampler.by_ref().count(), 2);
        assert!(sampler.next().is_none());
        sampler.restart().unwrap();
        assert_eq!(sampler.next().unwrap().unwrap().index, 0);
    }

    #[test]
    fn test_sequence_empty_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(SequenceSampler::open(dir.path(), 6., 64), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_sequence_corrupt_frame() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("0000.png"), b"not a png").unwrap();
        let mut sampler = SequenceSampler::open(dir.path(), 6., 64).unwrap();
        assert!(matches!(sampler.next(), Some(Err(Error::Decode { .. }))));
    }
}
