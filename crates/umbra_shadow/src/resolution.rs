//! Shadow map resolutions and their compact bucket indices.

/// Smallest supported shadow map width and height in texels.
pub const MIN_SHADOW_MAP_RESOLUTION: u32 = 256;

/// Largest supported shadow map width and height in texels.
pub const MAX_SHADOW_MAP_RESOLUTION: u32 = 4096;

/// Number of distinct shadow map resolutions, and hence the maximum number of
/// shared directional light texture arrays.
pub const N_RESOLUTION_BUCKETS: usize = 5;

/// Index of a resolution bucket, in `0..N_RESOLUTION_BUCKETS`.
pub type ResolutionBucket = u8;

/// Width and height of a square shadow map in texels. Always a power of two in
/// the range [`MIN_SHADOW_MAP_RESOLUTION`] to [`MAX_SHADOW_MAP_RESOLUTION`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShadowMapResolution(u32);

/// Named shadow map quality levels, each corresponding to a resolution.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShadowMapQuality {
    /// 256x256 texels.
    Low,
    /// 512x512 texels.
    #[default]
    Medium,
    /// 1024x1024 texels.
    High,
    /// 2048x2048 texels.
    VeryHigh,
    /// 4096x4096 texels.
    Ultra,
}

/// Returns the bucket index of the given shadow map resolution.
///
/// The resolution must be a power of two between
/// [`MIN_SHADOW_MAP_RESOLUTION`] and [`MAX_SHADOW_MAP_RESOLUTION`]. This is
/// only checked in debug builds.
pub fn size_to_index(size: u32) -> ResolutionBucket {
    debug_assert!(
        size.is_power_of_two(),
        "shadow map resolution {size} is not a power of two"
    );
    debug_assert!(
        size >= MIN_SHADOW_MAP_RESOLUTION,
        "shadow map resolution {size} is below {MIN_SHADOW_MAP_RESOLUTION}"
    );
    let index = (size.trailing_zeros() - MIN_SHADOW_MAP_RESOLUTION.trailing_zeros()) as u8;
    debug_assert!(
        usize::from(index) < N_RESOLUTION_BUCKETS,
        "shadow map resolution {size} is above {MAX_SHADOW_MAP_RESOLUTION}"
    );
    index
}

/// Returns the shadow map resolution corresponding to the given bucket index.
pub fn index_to_size(index: ResolutionBucket) -> u32 {
    debug_assert!(usize::from(index) < N_RESOLUTION_BUCKETS);
    MIN_SHADOW_MAP_RESOLUTION << index
}

impl ShadowMapResolution {
    /// Returns the resolution if `size` is a supported shadow map resolution,
    /// otherwise [`None`].
    pub const fn new(size: u32) -> Option<Self> {
        if size.is_power_of_two()
            && size >= MIN_SHADOW_MAP_RESOLUTION
            && size <= MAX_SHADOW_MAP_RESOLUTION
        {
            Some(Self(size))
        } else {
            None
        }
    }

    /// Returns the width and height in texels.
    pub const fn size(&self) -> u32 {
        self.0
    }

    /// Returns the bucket index of the resolution.
    pub fn bucket(&self) -> ResolutionBucket {
        size_to_index(self.0)
    }

    /// Returns the resolution of the given bucket.
    ///
    /// # Panics
    /// If `bucket` is not below [`N_RESOLUTION_BUCKETS`].
    pub fn from_bucket(bucket: ResolutionBucket) -> Self {
        assert!(usize::from(bucket) < N_RESOLUTION_BUCKETS);
        Self(index_to_size(bucket))
    }
}

impl Default for ShadowMapResolution {
    fn default() -> Self {
        ShadowMapQuality::default().resolution()
    }
}

impl From<ShadowMapQuality> for ShadowMapResolution {
    fn from(quality: ShadowMapQuality) -> Self {
        quality.resolution()
    }
}

impl From<ShadowMapResolution> for u32 {
    fn from(resolution: ShadowMapResolution) -> Self {
        resolution.0
    }
}

impl TryFrom<u32> for ShadowMapResolution {
    type Error = anyhow::Error;

    fn try_from(size: u32) -> anyhow::Result<Self> {
        Self::new(size).ok_or_else(|| {
            anyhow::anyhow!(
                "Shadow map resolution must be a power of two between \
                 {MIN_SHADOW_MAP_RESOLUTION} and {MAX_SHADOW_MAP_RESOLUTION}, got {size}"
            )
        })
    }
}

impl ShadowMapQuality {
    /// Returns the shadow map resolution for this quality level.
    pub const fn resolution(self) -> ShadowMapResolution {
        ShadowMapResolution(match self {
            Self::Low => 256,
            Self::Medium => 512,
            Self::High => 1024,
            Self::VeryHigh => 2048,
            Self::Ultra => 4096,
        })
    }
}
