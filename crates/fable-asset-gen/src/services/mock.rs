//! Mock generation service for offline use and tests
//!
//! Writes gradient PNG illustrations, grayscale conversions and silent WAV
//! narration into a local output directory without any network calls.

use crate::service::*;
use fable_core::{FableError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const MOCK_IMAGE_SIZE: u32 = 64;
const MOCK_VOICE_SECS: f64 = 0.5;

/// Per-operation call counts
#[derive(Debug, Default)]
pub struct CallCounts {
    story: AtomicUsize,
    image: AtomicUsize,
    voice: AtomicUsize,
    convert: AtomicUsize,
    fetch: AtomicUsize,
}

impl CallCounts {
    pub fn story(&self) -> usize {
        self.story.load(Ordering::SeqCst)
    }

    pub fn image(&self) -> usize {
        self.image.load(Ordering::SeqCst)
    }

    pub fn voice(&self) -> usize {
        self.voice.load(Ordering::SeqCst)
    }

    pub fn convert(&self) -> usize {
        self.convert.load(Ordering::SeqCst)
    }

    pub fn fetch(&self) -> usize {
        self.fetch.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.story() + self.image() + self.voice() + self.convert() + self.fetch()
    }
}

/// A generation service that produces placeholder assets locally
pub struct MockService {
    output_dir: PathBuf,
    calls: CallCounts,
    fail_images: AtomicBool,
    fail_conversions: AtomicBool,
}

impl MockService {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            calls: CallCounts::default(),
            fail_images: AtomicBool::new(false),
            fail_conversions: AtomicBool::new(false),
        }
    }

    /// Make image generation answer with a response that has no image field
    pub fn with_image_failure(self) -> Self {
        self.fail_images.store(true, Ordering::SeqCst);
        self
    }

    /// Make black/white conversion fail upstream
    pub fn with_conversion_failure(self) -> Self {
        self.fail_conversions.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> &CallCounts {
        &self.calls
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn output_path(&self, prefix: &str, ext: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(self
            .output_dir
            .join(format!("{}_{}.{}", prefix, uuid::Uuid::new_v4().simple(), ext)))
    }
}

impl GenerationService for MockService {
    fn name(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> Result<ServiceStatus> {
        Ok(ServiceStatus::Available)
    }

    fn generate_story(&self, request: &StoryRequest) -> Result<String> {
        self.calls.story.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "Once upon a time, {} set out on a {}. By nightfall every friend \
             they met along the way had a story of their own to tell.",
            request.name, request.theme
        ))
    }

    fn generate_image(&self, text: &str) -> Result<ImageLocation> {
        self.calls.image.fetch_add(1, Ordering::SeqCst);
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(FableError::MalformedResponse(
                "No image location in response".to_string(),
            ));
        }

        let path = self.output_path("image", "png")?;
        generate_gradient_png(&path, text, MOCK_IMAGE_SIZE)?;
        Ok(ImageLocation::Local(path.to_string_lossy().to_string()))
    }

    fn generate_voice(&self, request: &VoiceRequest) -> Result<VoiceClip> {
        self.calls.voice.fetch_add(1, Ordering::SeqCst);
        let seconds = MOCK_VOICE_SECS / f64::from(request.speed.max(0.1));
        Ok(VoiceClip {
            audio: silence_wav(seconds),
            voice: request.voice.clone(),
        })
    }

    fn convert_bw(&self, source: &str) -> Result<ConvertedImage> {
        self.calls.convert.fetch_add(1, Ordering::SeqCst);
        if self.fail_conversions.load(Ordering::SeqCst) {
            return Err(FableError::UpstreamUnavailable(
                "/convert/bwimage returned HTTP 500".to_string(),
            ));
        }

        let img = image::open(source).map_err(|e| {
            FableError::MalformedResponse(format!("Cannot read {}: {}", source, e))
        })?;
        let path = self.output_path("bw", "png")?;
        img.grayscale().save(&path).map_err(|e| {
            FableError::UpstreamUnavailable(format!("Failed to save conversion: {}", e))
        })?;
        Ok(ConvertedImage::Path(path.to_string_lossy().to_string()))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch.fetch_add(1, Ordering::SeqCst);
        Err(FableError::UpstreamUnavailable(format!(
            "mock service cannot download {}",
            url
        )))
    }
}

/// Write a square gradient PNG tinted by a hash of `seed_text`
fn generate_gradient_png(path: &Path, seed_text: &str, size: u32) -> Result<()> {
    let hash_val = seed_text
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let r = ((hash_val >> 16) & 0xFF) as u8;
    let g = ((hash_val >> 8) & 0xFF) as u8;
    let b = (hash_val & 0xFF) as u8;

    let img = image::RgbaImage::from_fn(size, size, |x, y| {
        let shade = ((x + y) * 255 / (size * 2).max(1)) as u8;
        image::Rgba([r.saturating_add(shade / 2), g, b.saturating_add(shade / 3), 255])
    });
    img.save(path)
        .map_err(|e| FableError::UpstreamUnavailable(format!("Failed to save PNG: {}", e)))
}

/// 16-bit mono PCM WAV containing silence
fn silence_wav(duration_secs: f64) -> Vec<u8> {
    let sample_rate: u32 = 22050;
    let num_channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let num_samples = (sample_rate as f64 * duration_secs) as u32;
    let data_size = num_samples * (bits_per_sample / 8) as u32 * num_channels as u32;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    let mut wav = Vec::with_capacity(44 + data_size as usize);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_size).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_size.to_le_bytes());
    wav.resize(44 + data_size as usize, 0);
    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fable_mock_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_mock_health() {
        let service = MockService::new(temp_dir());
        assert_eq!(service.health_check().unwrap(), ServiceStatus::Available);
    }

    #[test]
    fn test_mock_image_and_conversion() {
        let dir = temp_dir();
        let service = MockService::new(&dir);

        let location = service.generate_image("a whale under the moon").unwrap();
        let ImageLocation::Local(path) = location else {
            panic!("mock images are local");
        };
        let img = image::open(&path).unwrap();
        assert_eq!(img.width(), MOCK_IMAGE_SIZE);

        let converted = service.convert_bw(&path).unwrap();
        let ConvertedImage::Path(bw_path) = converted else {
            panic!("mock conversions write a file");
        };
        let bw = image::open(&bw_path).unwrap();
        assert!(matches!(bw, image::DynamicImage::ImageLumaA8(_)));

        assert_eq!(service.calls().image(), 1);
        assert_eq!(service.calls().convert(), 1);
        assert_eq!(service.calls().total(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_mock_voice_is_wav() {
        let service = MockService::new(temp_dir());
        let clip = service
            .generate_voice(&VoiceRequest::new("hi", Some("nova"), None, "alloy"))
            .unwrap();
        assert_eq!(&clip.audio[..4], b"RIFF");
        assert_eq!(&clip.audio[8..12], b"WAVE");
        assert_eq!(clip.voice, "nova");
    }

    #[test]
    fn test_mock_image_failure() {
        let service = MockService::new(temp_dir()).with_image_failure();
        assert!(matches!(
            service.generate_image("x"),
            Err(FableError::MalformedResponse(_))
        ));
        assert_eq!(service.calls().image(), 1);
    }
}
