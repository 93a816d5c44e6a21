//! Per-tile triangle geometry.
//!
//! Each tile is two triangles (six vertices) spanning the unit square with
//! corners at `nw=(0,_,0)`, `ne=(1,_,0)`, `se=(1,_,1)`, `sw=(0,_,1)`. Corner
//! heights are relative to the cell's base height. Inverted tiles split the
//! quad along the other diagonal so the fold follows the raised corner.

use std::sync::OnceLock;

use bevy::math::Vec3;

use super::{TileType, TILE_TYPE_COUNT};

/// Six vertices (two counter-clockwise triangles seen from above) with a face
/// normal per vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGeometry {
    pub vertices: [Vec3; 6],
    pub normals: [Vec3; 6],
}

/// Corner heights in `[nw, ne, se, sw]` order plus the diagonal flag.
#[must_use]
pub const fn corner_heights(tile: TileType) -> ([f32; 4], bool) {
    match tile {
        TileType::Flat => ([0.0, 0.0, 0.0, 0.0], false),
        TileType::SlopeN => ([1.0, 1.0, 0.0, 0.0], false),
        TileType::SlopeE => ([0.0, 1.0, 1.0, 0.0], false),
        TileType::SlopeS => ([0.0, 0.0, 1.0, 1.0], false),
        TileType::SlopeW => ([1.0, 0.0, 0.0, 1.0], false),
        TileType::CornerNw => ([1.0, 0.0, 0.0, 0.0], true),
        TileType::CornerNe => ([0.0, 1.0, 0.0, 0.0], false),
        TileType::CornerSw => ([0.0, 0.0, 0.0, 1.0], false),
        TileType::CornerSe => ([0.0, 0.0, 1.0, 0.0], true),
        TileType::CornerSwInverted => ([1.0, 0.0, 1.0, 1.0], false),
        TileType::CornerSeInverted => ([0.0, 1.0, 1.0, 1.0], true),
        TileType::CornerNeInverted => ([1.0, 1.0, 0.0, 1.0], true),
        TileType::CornerNwInverted => ([1.0, 1.0, 1.0, 0.0], false),
        TileType::SteepSw => ([1.0, 0.0, 1.0, 2.0], false),
        TileType::SteepSe => ([0.0, 1.0, 2.0, 1.0], true),
        TileType::SteepNw => ([2.0, 1.0, 0.0, 1.0], true),
        TileType::SteepNe => ([1.0, 2.0, 1.0, 0.0], false),
        TileType::SaddleNesw => ([0.0, 1.0, 0.0, 1.0], false),
        TileType::SaddleNwse => ([1.0, 0.0, 1.0, 0.0], true),
    }
}

fn build(tile: TileType) -> TileGeometry {
    let ([h_nw, h_ne, h_se, h_sw], inverted) = corner_heights(tile);
    let nw = Vec3::new(0.0, h_nw, 0.0);
    let ne = Vec3::new(1.0, h_ne, 0.0);
    let se = Vec3::new(1.0, h_se, 1.0);
    let sw = Vec3::new(0.0, h_sw, 1.0);

    let vertices = if inverted {
        [ne, nw, sw, ne, sw, se]
    } else {
        [nw, sw, se, nw, se, ne]
    };

    let mut normals = [Vec3::Y; 6];
    for tri in 0..2 {
        let [a, b, c] = [vertices[tri * 3], vertices[tri * 3 + 1], vertices[tri * 3 + 2]];
        let n = (b - a).cross(c - a).try_normalize().unwrap_or(Vec3::Y);
        normals[tri * 3..tri * 3 + 3].fill(n);
    }

    TileGeometry { vertices, normals }
}

static TILE_GEOMETRY: OnceLock<[TileGeometry; TILE_TYPE_COUNT]> = OnceLock::new();

/// Geometry for `tile`. The table is built on first use and shared afterwards.
#[must_use]
pub fn tile_geometry(tile: TileType) -> &'static TileGeometry {
    let table = TILE_GEOMETRY.get_or_init(|| TileType::ALL.map(build));
    &table[tile.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tile_faces_up() {
        for tile in TileType::ALL {
            let geom = tile_geometry(tile);
            for n in geom.normals {
                assert!(n.y > 0.0, "{tile:?} has a downward normal {n:?}");
                assert!((n.length() - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn flat_tile_is_level_unit_square() {
        let geom = tile_geometry(TileType::Flat);
        assert!(geom.vertices.iter().all(|v| v.y == 0.0));
        assert!(geom.normals.iter().all(|n| *n == Vec3::Y));
        let min = geom.vertices.iter().fold(Vec3::splat(f32::MAX), |a, v| a.min(*v));
        let max = geom.vertices.iter().fold(Vec3::splat(f32::MIN), |a, v| a.max(*v));
        assert_eq!(min, Vec3::ZERO);
        assert_eq!(max, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn inverted_tiles_split_along_other_diagonal() {
        let plain = tile_geometry(TileType::CornerNe);
        let inverted = tile_geometry(TileType::CornerNw);
        // plain: shared edge nw-se ; inverted: shared edge ne-sw
        assert_eq!(plain.vertices[0], plain.vertices[3]);
        assert_eq!(plain.vertices[2], plain.vertices[4]);
        assert_eq!(inverted.vertices[0].x, 1.0);
        assert_eq!(inverted.vertices[0].z, 0.0);
        assert_eq!(inverted.vertices[2], inverted.vertices[4]);
    }

    #[test]
    fn corner_heights_peak_at_two() {
        for tile in TileType::ALL {
            let (h, _) = corner_heights(tile);
            let max = h.iter().copied().fold(0.0_f32, f32::max);
            let min = h.iter().copied().fold(f32::MAX, f32::min);
            assert_eq!(min, 0.0, "{tile:?} must touch the base height");
            assert!(max <= 2.0);
        }
    }

    #[test]
    fn table_is_built_once() {
        let a = tile_geometry(TileType::SlopeN) as *const TileGeometry;
        let b = tile_geometry(TileType::SlopeN) as *const TileGeometry;
        assert_eq!(a, b);
    }
}
