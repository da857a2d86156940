//! Signed-distance-field shadow samples and their quantized container.

use crate::{CropRect, LightId, crop_to_mapped_bounds};

/// Full-precision shadow sample from the solver: distance and penumbra are
/// pre-normalized to `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShadowSample {
    pub distance: f32,
    pub penumbra_size: f32,
    pub is_mapped: bool,
}

/// Quantized shadow sample. Quantization is fixed (`round(v * 255)` clamped
/// to a byte), so no per-tile scale/bias is carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuantizedShadowSample {
    pub distance: u8,
    pub penumbra_size: u8,
    pub coverage: u8,
}

impl QuantizedShadowSample {
    #[inline]
    pub fn quantize(s: ShadowSample) -> Self {
        Self {
            distance: (s.distance * 255.0).round().clamp(0.0, 255.0) as u8,
            penumbra_size: (s.penumbra_size * 255.0).round().clamp(0.0, 255.0) as u8,
            coverage: if s.is_mapped { 255 } else { 0 },
        }
    }

    #[inline]
    pub fn decoded_distance(&self) -> f32 {
        self.distance as f32 / 255.0
    }
}

impl From<ShadowSample> for QuantizedShadowSample {
    fn from(s: ShadowSample) -> Self {
        Self::quantize(s)
    }
}

/// One tile's shadow map for a single light.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShadowMapData {
    pub light_id: LightId,
    pub size_x: u32,
    pub size_y: u32,
    pub samples: Vec<QuantizedShadowSample>,
}

impl ShadowMapData {
    /// Quantizes full-precision solver samples.
    ///
    /// Panics when the sample array does not match `size_x * size_y`: a
    /// solver contract violation, not a recoverable state.
    pub fn from_samples(
        light_id: LightId,
        size_x: u32,
        size_y: u32,
        samples: &[ShadowSample],
    ) -> Self {
        assert_eq!(samples.len(), size_x as usize * size_y as usize);
        Self {
            light_id,
            size_x,
            size_y,
            samples: samples
                .iter()
                .map(|&s| QuantizedShadowSample::quantize(s))
                .collect(),
        }
    }

    /// Wraps already-quantized samples.
    pub fn from_quantized(
        light_id: LightId,
        size_x: u32,
        size_y: u32,
        samples: Vec<QuantizedShadowSample>,
    ) -> Self {
        assert_eq!(samples.len(), size_x as usize * size_y as usize);
        Self {
            light_id,
            size_x,
            size_y,
            samples,
        }
    }

    #[inline]
    fn sample_at(&self, x: u32, y: u32) -> &QuantizedShadowSample {
        &self.samples[(y * self.size_x + x) as usize]
    }

    pub fn has_mapped_texels(&self) -> bool {
        self.samples.iter().any(|s| s.coverage != 0)
    }

    pub fn mapped_bounds(&self) -> CropRect {
        crop_to_mapped_bounds(self.size_x, self.size_y, |x, y| {
            self.sample_at(x, y).coverage != 0
        })
    }

    /// Same crop contract as the lightmap container: `None` means nothing
    /// mapped, skip encoding.
    pub fn cropped(&self) -> Option<(CropRect, ShadowMapData)> {
        let rect = self.mapped_bounds();
        if rect.is_empty() {
            return None;
        }
        let mut samples = Vec::with_capacity((rect.width() * rect.height()) as usize);
        for y in rect.min_y..rect.max_y {
            for x in rect.min_x..rect.max_x {
                samples.push(*self.sample_at(x, y));
            }
        }
        Some((
            rect,
            ShadowMapData {
                light_id: self.light_id,
                size_x: rect.width(),
                size_y: rect.height(),
                samples,
            },
        ))
    }
}
