use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{self, Flags};
use ffmpeg::util::frame::video::Video;
use image::{DynamicImage, RgbImage};
use log::debug;

use crate::error::{Error, Result};
use crate::fingerprint::normalize_width;
use crate::sampler::{FrameSource, SampledFrame};

/// 使用 ffmpeg 解码视频，每 1 / sample_rate 秒取一帧
pub struct VideoSampler {
    path: PathBuf,
    sample_rate: f64,
    frame_width: u32,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    time_base: f64,
    next_index: u64,
    flushed: bool,
}

impl VideoSampler {
    pub fn open(path: impl AsRef<Path>, sample_rate: f64, frame_width: u32) -> Result<Self> {
        let path = path.as_ref();
        let err = |e: ffmpeg::Error| Error::decode(path, e);

        ffmpeg::init().map_err(err)?;
        let input = ffmpeg::format::input(&path).map_err(err)?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| Error::decode(path, "找不到视频流"))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());

        let context =
            ffmpeg::codec::context::Context::from_parameters(stream.parameters()).map_err(err)?;
        let decoder = context.decoder().video().map_err(err)?;
        // 只做像素格式转换，缩放交给 normalize_width，保证与查询时的处理一致
        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )
        .map_err(err)?;

        debug!(
            "打开视频 {}: {}x{}, time_base = {}",
            path.display(),
            decoder.width(),
            decoder.height(),
            time_base
        );

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate,
            frame_width,
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            next_index: 0,
            flushed: false,
        })
    }

    /// 尝试从解码器中取出下一个需要的帧
    fn receive(&mut self) -> Option<Result<SampledFrame>> {
        let mut decoded = Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let Some(pts) = decoded.timestamp().or(decoded.pts()) else {
                continue;
            };
            let seconds = pts as f64 * self.time_base;
            if seconds < 0. {
                continue;
            }
            // 每个采样区间只保留第一帧
            let index = (seconds * self.sample_rate).floor() as u64;
            if index < self.next_index {
                continue;
            }
            self.next_index = index + 1;
            return Some(self.convert(&decoded).map(|image| SampledFrame {
                index,
                elapsed: index as f64 / self.sample_rate,
                image,
            }));
        }
        None
    }

    fn convert(&mut self, frame: &Video) -> Result<DynamicImage> {
        let mut rgb = Video::empty();
        self.scaler.run(frame, &mut rgb).map_err(|e| Error::decode(&self.path, e))?;

        let (width, height) = (rgb.width(), rgb.height());
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let row = width as usize * 3;
        let mut buf = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            buf.extend_from_slice(&data[y * stride..y * stride + row]);
        }
        let img = RgbImage::from_raw(width, height, buf)
            .ok_or_else(|| Error::decode(&self.path, "帧数据长度不正确"))?;
        Ok(normalize_width(DynamicImage::ImageRgb8(img), self.frame_width))
    }
}

impl Iterator for VideoSampler {
    type Item = Result<SampledFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.receive() {
                return Some(frame);
            }
            if self.flushed {
                return None;
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        return Some(Err(Error::decode(&self.path, e)));
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.flushed = true;
                    if let Err(e) = self.decoder.send_eof() {
                        return Some(Err(Error::decode(&self.path, e)));
                    }
                }
                Err(e) => return Some(Err(Error::decode(&self.path, e))),
            }
        }
    }
}

impl FrameSource for VideoSampler {
    fn path(&self) -> &Path {
        &self.path
    }

    fn restart(&mut self) -> Result<()> {
        *self = Self::open(&self.path, self.sample_rate, self.frame_width)?;
        Ok(())
    }
}
