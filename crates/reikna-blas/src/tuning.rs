//! Tuning tables: every size threshold and tile geometry the dispatch
//! layer consults, gathered into one serializable structure.
//!
//! The defaults carry constants tuned on the hardware the kernels were
//! profiled against; they are starting points, not truths about other
//! devices. Installations with different accelerators load their own
//! table once per handle instead of patching literals across the tree.

use serde::{Deserialize, Serialize};

use crate::types::Precision;

/// One threshold per element precision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub f16: i64,
    pub bf16: i64,
    pub f32: i64,
    pub f64: i64,
    pub c32: i64,
    pub c64: i64,
}

impl ThresholdTable {
    pub fn get(&self, p: Precision) -> i64 {
        match p {
            Precision::F16 => self.f16,
            Precision::BF16 => self.bf16,
            Precision::F32 => self.f32,
            Precision::F64 => self.f64,
            Precision::C32 => self.c32,
            Precision::C64 => self.c64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DotTunables {
    /// Lanes per group for the generic two-phase kernel.
    pub group_size: u32,
    /// Lanes per group when the whole problem fits one group.
    pub single_group_size: u32,
    /// Elements per lane in the single-group kernel.
    pub single_group_work: u32,
    /// Below this n (with enough batches) each batch element gets its own
    /// wavefront and the workspace protocol is skipped entirely.
    pub wave_per_batch_max_n: i64,
    pub wave_per_batch_min_batch: i32,
    /// Largest n still forced onto a single group, per precision.
    pub single_group_threshold: ThresholdTable,
    /// Architecture whose unrolled-by-4 variant is worth dispatching.
    pub unrolled_arch: u32,
    /// Smallest n for the unrolled-by-4 variant.
    pub unrolled_min_n: i64,
}

impl Default for DotTunables {
    fn default() -> Self {
        Self {
            group_size: 512,
            single_group_size: 1024,
            single_group_work: 32,
            wave_per_batch_max_n: 1024,
            wave_per_batch_min_batch: 256,
            single_group_threshold: ThresholdTable {
                f16: 32768,
                bf16: 32768,
                f32: 31000,
                f64: 13000,
                c32: 16000,
                c64: 10000,
            },
            unrolled_arch: 1,
            unrolled_min_n: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GemvTunables {
    /// (x, y) lanes of the non-transpose tiled kernel.
    pub n_group: (u32, u32),
    /// Lanes per group for the transpose group-per-column kernel.
    pub t_group_size: u32,
    /// Largest m routed to the shared-x small-matrix transpose kernel.
    pub small_m_max: i64,
    /// Batched tiny-matrix kernel: m and n bound, minimum batch count,
    /// eligible architecture.
    pub small_mn_max: i64,
    pub small_mn_min_batch: i32,
    pub small_mn_arch: u32,
    /// Skinny-n two-phase transpose: column and row bounds.
    pub skinny_max_n: i64,
    pub skinny_min_m: i64,
    pub skinny_group_size: u32,
    /// Double-buffered tilings: eligible architecture, minimum square
    /// size, and tile edge (rows must divide by it).
    pub double_buffer_arch: u32,
    pub double_buffer_min: i64,
    pub double_buffer_tile: u32,
    pub double_buffer_group_y: u32,
    /// Lanes per group for the standalone beta-scaling kernel.
    pub scal_group_size: u32,
}

impl Default for GemvTunables {
    fn default() -> Self {
        Self {
            n_group: (64, 16),
            t_group_size: 256,
            small_m_max: 64,
            small_mn_max: 32,
            small_mn_min_batch: 256,
            small_mn_arch: 1,
            skinny_max_n: 32,
            skinny_min_m: 2048,
            skinny_group_size: 256,
            double_buffer_arch: 1,
            double_buffer_min: 2000,
            double_buffer_tile: 64,
            double_buffer_group_y: 16,
            scal_group_size: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GerTunables {
    /// (x, y) lanes of the generic tiled kernel.
    pub tile: (u32, u32),
    /// Columns handled per lane in the generic tiled kernel.
    pub work: u32,
    /// Single-precision column-per-group path: minimum m and group size.
    pub col_kernel_min_m: i64,
    pub col_group_size: u32,
    /// Architecture with the paired-element column kernel.
    pub paired_arch: u32,
    pub paired_group_size: u32,
    /// Double-buffered square variant: minimum size and per-precision
    /// tile edges (x, y).
    pub double_buffer_arch: u32,
    pub double_buffer_min: i64,
    pub db_tile_f32: (u32, u32),
    pub db_tile: (u32, u32),
}

impl Default for GerTunables {
    fn default() -> Self {
        Self {
            tile: (32, 32),
            work: 2,
            col_kernel_min_m: 1024,
            col_group_size: 1024,
            paired_arch: 1,
            paired_group_size: 256,
            double_buffer_arch: 1,
            double_buffer_min: 2000,
            db_tile_f32: (128, 8),
            db_tile: (64, 16),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyrTunables {
    /// (x, y) lanes of the triangular update kernels.
    pub tile: (u32, u32),
    /// Row elements per lane for single precision.
    pub f32_work: u32,
}

impl Default for SyrTunables {
    fn default() -> Self {
        Self {
            tile: (128, 8),
            f32_work: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GemmTunables {
    /// Square tile edge of the source-level fallback kernel.
    pub tile: u32,
}

impl Default for GemmTunables {
    fn default() -> Self {
        Self { tile: 16 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub dot: DotTunables,
    pub gemv: GemvTunables,
    pub ger: GerTunables,
    pub syr: SyrTunables,
    pub gemm: GemmTunables,
}
