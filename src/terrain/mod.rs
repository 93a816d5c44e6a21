//! Heightfield sampling.
//!
//! `HeightSampler` is the one thing chunk generation needs from the world: a
//! height for an integer world position. `NoiseHeightSampler` is the default
//! implementation, layering a low-frequency continent noise under a fractal
//! detail noise. Plain closures also implement the trait, which keeps test
//! terrains short.

use noise::{Billow, Fbm, MultiFractal, NoiseFn, Perlin, RidgedMulti, Seedable, Simplex};

use crate::chunk::{ChunkCoord, ChunkError, CHUNK_SIZE, CHUNK_SIZE_I32, MAX_HEIGHT};
use crate::settings::{FractalKind, GenerationSettings, NoiseKind, NoiseSettings};

/// Samples per edge of the padded heightfield a chunk is classified from.
pub const PADDED_SIZE: usize = CHUNK_SIZE + 1;

/// Source of terrain heights.
pub trait HeightSampler {
    /// Height at a world grid position, in world units. Values outside
    /// `[0, MAX_HEIGHT]` are clamped by the caller; non-finite values are errors.
    fn height(&self, world_x: i32, world_z: i32) -> f32;
}

impl<F> HeightSampler for F
where
    F: Fn(i32, i32) -> f32,
{
    fn height(&self, world_x: i32, world_z: i32) -> f32 {
        self(world_x, world_z)
    }
}

/// Fill `out` with the `(CHUNK_SIZE + 1)^2` row-major heightfield for `coord`,
/// rounded and clamped to `[0, MAX_HEIGHT]`.
///
/// # Errors
/// `ChunkError::Generation` if the sampler yields a non-finite height.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn fill_heightfield<S: HeightSampler + ?Sized>(
    sampler: &S,
    coord: ChunkCoord,
    out: &mut Vec<i32>,
) -> Result<(), ChunkError> {
    out.clear();
    out.reserve(PADDED_SIZE * PADDED_SIZE);
    let origin_x = coord.x.saturating_mul(CHUNK_SIZE_I32);
    let origin_z = coord.z.saturating_mul(CHUNK_SIZE_I32);
    for z in 0..PADDED_SIZE as i32 {
        for x in 0..PADDED_SIZE as i32 {
            let (wx, wz) = (origin_x.saturating_add(x), origin_z.saturating_add(z));
            let h = sampler.height(wx, wz);
            if !h.is_finite() {
                return Err(ChunkError::Generation(format!(
                    "sampler returned {h} at ({wx}, {wz}) for chunk {coord}"
                )));
            }
            out.push((h.round() as i32).clamp(0, MAX_HEIGHT));
        }
    }
    Ok(())
}

/// Piecewise-linear remap of normalized heights. Empty means identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeightCurve {
    points: Vec<[f32; 2]>,
}

impl HeightCurve {
    /// Build a curve from `(input, output)` points. Points are sorted by input
    /// and non-finite ones dropped.
    #[must_use]
    pub fn new(points: &[[f32; 2]]) -> Self {
        let mut points: Vec<[f32; 2]> = points
            .iter()
            .copied()
            .filter(|[i, o]| i.is_finite() && o.is_finite())
            .collect();
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Self { points }
    }

    #[must_use]
    pub fn apply(&self, t: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return t;
        };
        if t <= first[0] {
            return first[1];
        }
        if t >= last[0] {
            return last[1];
        }
        let upper = self.points.partition_point(|p| p[0] <= t);
        let [x0, y0] = self.points[upper - 1];
        let [x1, y1] = self.points[upper];
        if x1 <= x0 {
            return y1;
        }
        y0 + (y1 - y0) * (t - x0) / (x1 - x0)
    }
}

pub type BoxedNoise = Box<dyn NoiseFn<f64, 2> + Send + Sync>;

fn fractal<T>(kind: FractalKind, seed: u32, octaves: usize, frequency: f64, persistence: f64, lacunarity: f64) -> BoxedNoise
where
    T: Default + Seedable + NoiseFn<f64, 2> + Send + Sync + 'static,
{
    match kind {
        FractalKind::Fbm => Box::new(
            Fbm::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_persistence(persistence)
                .set_lacunarity(lacunarity),
        ),
        FractalKind::Ridged => Box::new(
            RidgedMulti::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_persistence(persistence)
                .set_lacunarity(lacunarity),
        ),
        FractalKind::Billow => Box::new(
            Billow::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_persistence(persistence)
                .set_lacunarity(lacunarity),
        ),
    }
}

fn layer(base: NoiseKind, kind: FractalKind, seed: u32, octaves: usize, frequency: f64, noise: &NoiseSettings) -> BoxedNoise {
    match base {
        NoiseKind::Perlin => fractal::<Perlin>(kind, seed, octaves, frequency, noise.persistence, noise.lacunarity),
        NoiseKind::Simplex => fractal::<Simplex>(kind, seed, octaves, frequency, noise.persistence, noise.lacunarity),
    }
}

/// Continent + detail noise terrain.
///
/// The continent layer is always fBm at `base_frequency` with half the
/// configured octaves (at least two), remapped to `[0, 1]`. The detail layer
/// uses the configured fractal at `detail_frequency`, seeded `seed + 1000`,
/// weighted by `detail_strength`. The sum is centred, clamped to `[0, 1]`,
/// passed through the height curve and scaled to `height_scale * MAX_HEIGHT`.
pub struct NoiseHeightSampler {
    continent: BoxedNoise,
    detail: BoxedNoise,
    detail_strength: f64,
    curve: HeightCurve,
    height_scale: f32,
}

impl NoiseHeightSampler {
    #[must_use]
    pub fn new(settings: &GenerationSettings) -> Self {
        let noise = &settings.noise;
        let continent = layer(
            noise.kind,
            FractalKind::Fbm,
            noise.seed,
            (noise.octaves / 2).max(2),
            noise.base_frequency,
            noise,
        );
        let detail = layer(
            noise.kind,
            noise.fractal,
            noise.seed.wrapping_add(1000),
            noise.octaves.max(1),
            noise.detail_frequency,
            noise,
        );
        Self {
            continent,
            detail,
            detail_strength: noise.detail_strength,
            curve: HeightCurve::new(&noise.height_curve),
            height_scale: settings.height_scale.clamp(0.0, 1.0),
        }
    }

    /// Combined noise in `[0, 1]` before the height curve.
    #[must_use]
    pub fn normalized(&self, x: f64, z: f64) -> f64 {
        let continent = (self.continent.get([x, z]) + 1.0) * 0.5;
        let detail = self.detail.get([x, z]) * self.detail_strength;
        ((continent + detail + 1.0) * 0.5).clamp(0.0, 1.0)
    }
}

impl HeightSampler for NoiseHeightSampler {
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn height(&self, world_x: i32, world_z: i32) -> f32 {
        let n = self.normalized(f64::from(world_x), f64::from(world_z)) as f32;
        self.curve.apply(n) * self.height_scale * MAX_HEIGHT as f32
    }
}
