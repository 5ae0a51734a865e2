//! Perceptual content hashes.
//!
//! Every hash is a bit vector packed into lowercase hex nibbles, tagged with
//! the method that produced it (`dhash-8`, `rgbhist-4`, ...). Only hashes of
//! the same method are ever compared.

pub mod neighbors;
pub mod spectrogram;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::config::HashingConfig;
use crate::error::{Error, Result};
use crate::model::{Asset, HashRecord, Medium};
use crate::transcoder::Transcoder;

pub use neighbors::{hamming_ball, neighbors, similar_by_content};
use spectrogram::{Spectrogram, FFT_SIZE, HOP_SIZE, MEL_BANDS};

/// Lookup of stored hashes.
pub trait HashStore {
    fn hashes_for_asset(&self, asset_id: i64) -> Result<Vec<HashRecord>>;

    /// Stored hashes of `method` whose nibbles are exactly one of `nibbles`.
    fn find_hashes(&self, method: &str, nibbles: &[String]) -> Result<Vec<HashRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashMethod {
    /// Difference hash over an `(n+1) x n` grid, `n * n` bits.
    Diff(u32),
    /// RGB histogram split into `3n` chunks, `3n` bits.
    RgbHistogram(u32),
}

impl HashMethod {
    pub fn bits(&self) -> usize {
        match *self {
            HashMethod::Diff(n) => (n * n) as usize,
            HashMethod::RgbHistogram(n) => 3 * n as usize,
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashMethod::Diff(n) => write!(f, "dhash-{n}"),
            HashMethod::RgbHistogram(n) => write!(f, "rgbhist-{n}"),
        }
    }
}

impl FromStr for HashMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || Error::UnknownMethod(s.to_string());
        let (family, size) = s.rsplit_once('-').ok_or_else(unknown)?;
        let size: u32 = size.parse().map_err(|_| unknown())?;
        match family {
            "dhash" => Ok(HashMethod::Diff(size)),
            "rgbhist" => Ok(HashMethod::RgbHistogram(size)),
            _ => Err(unknown()),
        }
    }
}

/// Pack bits, most significant first, into hex nibbles.
pub fn bits_to_nibbles(bits: &[bool]) -> Result<String> {
    if bits.len() % 4 != 0 {
        return Err(Error::HashBits(bits.len()));
    }
    Ok(bits
        .chunks(4)
        .map(|chunk| {
            let value = chunk.iter().fold(0u32, |acc, &bit| (acc << 1) | bit as u32);
            char::from_digit(value, 16).unwrap_or('0')
        })
        .collect())
}

/// Number of differing bits between two digests of equal length.
pub fn hamming_distance(a: &str, b: &str) -> Result<u32> {
    if a.len() != b.len() {
        return Err(Error::InvalidNibbles(format!("{a} vs {b}")));
    }
    a.chars().zip(b.chars()).try_fold(0, |acc, (x, y)| {
        match (x.to_digit(16), y.to_digit(16)) {
            (Some(x), Some(y)) => Ok(acc + (x ^ y).count_ones()),
            _ => Err(Error::InvalidNibbles(format!("{a} vs {b}"))),
        }
    })
}

fn check_diff_size(size: u32) -> Result<()> {
    if size == 0 || size.checked_mul(size).map_or(true, |bits| bits % 4 != 0) {
        return Err(Error::HashSize(format!("dhash-{size}")));
    }
    Ok(())
}

fn diff_bits(rows: usize, value: impl Fn(usize, usize) -> f32) -> Vec<bool> {
    (0..rows)
        .flat_map(|i| (0..rows).map(move |j| (i, j)))
        .map(|(i, j)| value(i, j + 1) > value(i, j))
        .collect()
}

/// Difference hash of a grayscale image, resized to `(size+1) x size`.
pub fn dhash_luma(gray: &GrayImage, size: u32) -> Result<String> {
    check_diff_size(size)?;
    let small = image::imageops::resize(gray, size + 1, size, FilterType::Triangle);
    let bits = diff_bits(size as usize, |row, col| {
        small.get_pixel(col as u32, row as u32)[0] as f32
    });
    bits_to_nibbles(&bits)
}

/// Difference hash of the largest centered square of an image.
pub fn dhash_image(img: &DynamicImage, size: u32) -> Result<String> {
    let (w, h) = (img.width(), img.height());
    let side = w.min(h);
    if side == 0 {
        return Err(Error::HashSize(format!("empty image for dhash-{size}")));
    }
    let square = img.crop_imm((w - side) / 2, (h - side) / 2, side, side);
    dhash_luma(&square.to_luma8(), size)
}

/// Difference hash of a row-major grid of values, box-averaged down to
/// `size` rows by `size + 1` columns.
pub fn dhash_grid(grid: &[Vec<f32>], size: u32) -> Result<String> {
    check_diff_size(size)?;
    let rows = grid.len();
    let cols = grid.first().map_or(0, Vec::len);
    let (out_rows, out_cols) = (size as usize, size as usize + 1);
    if rows < out_rows || cols < out_cols {
        return Err(Error::HashSize(format!(
            "{rows}x{cols} grid is too small for dhash-{size}"
        )));
    }

    let cell = |r: usize, c: usize| {
        let (r0, r1) = (r * rows / out_rows, (r + 1) * rows / out_rows);
        let (c0, c1) = (c * cols / out_cols, (c + 1) * cols / out_cols);
        let mut sum = 0.0;
        for row in &grid[r0..r1] {
            sum += row[c0..c1].iter().sum::<f32>();
        }
        sum / ((r1 - r0) * (c1 - c0)) as f32
    };
    let small: Vec<Vec<f32>> = (0..out_rows)
        .map(|r| (0..out_cols).map(|c| cell(r, c)).collect())
        .collect();

    bits_to_nibbles(&diff_bits(out_rows, |row, col| small[row][col]))
}

/// Histogram hash: bit `k` is set when chunk `k` of the 768-bin RGB histogram
/// holds more than the mean chunk count.
pub fn histogram_hash(img: &DynamicImage, size: u32) -> Result<String> {
    if size == 0 || 256 % size != 0 || (3 * size) % 4 != 0 {
        return Err(Error::HashSize(format!("rgbhist-{size}")));
    }
    let mut histogram = [0u64; 768];
    for pixel in img.to_rgb8().pixels() {
        for (channel, &value) in pixel.0.iter().enumerate() {
            histogram[channel * 256 + value as usize] += 1;
        }
    }

    let chunks: Vec<u64> = histogram
        .chunks(768 / (3 * size as usize))
        .map(|chunk| chunk.iter().sum())
        .collect();
    let mean = chunks.iter().sum::<u64>() as f64 / chunks.len() as f64;
    let bits: Vec<bool> = chunks.iter().map(|&c| c as f64 > mean).collect();
    bits_to_nibbles(&bits)
}

pub fn photo_hashes(img: &DynamicImage, config: &HashingConfig) -> Result<Vec<HashRecord>> {
    let mut records = Vec::new();
    for &size in &config.photo_sizes {
        records.push(HashRecord::new(
            HashMethod::Diff(size).to_string(),
            dhash_image(img, size)?,
        ));
    }
    for &size in &config.histogram_sizes {
        records.push(HashRecord::new(
            HashMethod::RgbHistogram(size).to_string(),
            histogram_hash(img, size)?,
        ));
    }
    Ok(records)
}

/// Difference hashes of consecutive `stride`-second windows of a log-mel
/// spectrogram. Each record's time is the window offset.
pub fn audio_hashes(
    samples: &[f32],
    sample_rate: u32,
    stride: f64,
    size: u32,
) -> Result<Vec<HashRecord>> {
    let mut spectrogram = Spectrogram::new(FFT_SIZE, HOP_SIZE);
    let frames = spectrogram.log_mel(samples, sample_rate, MEL_BANDS);
    let per_window = ((stride * spectrogram.frame_rate(sample_rate)) as usize).max(1);
    let method = HashMethod::Diff(size).to_string();

    let mut records = Vec::new();
    for (index, window) in frames.chunks(per_window).enumerate() {
        if window.len() <= size as usize {
            break;
        }
        let grid: Vec<Vec<f32>> = (0..MEL_BANDS)
            .rev()
            .map(|band| window.iter().map(|frame| frame[band]).collect())
            .collect();
        records.push(HashRecord::new(method.clone(), dhash_grid(&grid, size)?).at(index as f64 * stride));
    }
    Ok(records)
}

/// Difference hashes of video frames taken every `stride` seconds.
pub fn video_hashes(
    path: &Path,
    duration: f64,
    stride: f64,
    size: u32,
    transcoder: &Transcoder,
) -> Result<Vec<HashRecord>> {
    let workdir = tempfile::tempdir()?;
    let frame_path = workdir.path().join("frame.png");
    let method = HashMethod::Diff(size).to_string();

    let mut records = Vec::new();
    let mut offset = 0.0;
    loop {
        transcoder.extract_frame(path, offset, &frame_path)?;
        let frame = image::open(&frame_path)?;
        records.push(HashRecord::new(method.clone(), dhash_image(&frame, size)?).at(offset));

        offset += stride;
        if offset >= duration {
            break;
        }
    }
    Ok(records)
}

/// All configured hashes for an asset.
pub fn compute_hashes(
    asset: &Asset,
    config: &HashingConfig,
    transcoder: &Transcoder,
) -> Result<Vec<HashRecord>> {
    if asset.medium != Medium::Photo && !(config.stride > 0.0 && config.stride.is_finite()) {
        return Err(Error::InvalidStride(config.stride));
    }

    let path = Path::new(&asset.path);
    let records = match asset.medium {
        Medium::Photo => photo_hashes(&image::open(path)?, config)?,
        Medium::Audio => {
            let samples = transcoder.decode_audio(path, config.sample_rate)?;
            audio_hashes(&samples, config.sample_rate, config.stride, config.temporal_size)?
        }
        Medium::Video => video_hashes(
            path,
            asset.duration.unwrap_or(0.0),
            config.stride,
            config.temporal_size,
            transcoder,
        )?,
    };
    tracing::debug!(slug = %asset.slug, count = records.len(), "Computed hashes");
    Ok(records)
}
