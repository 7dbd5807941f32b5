//! Kernel variant selection.
//!
//! Each `select_*` function is pure: the same inputs always produce the
//! same plan, with every threshold read from the [`Tunables`] table and
//! the architecture taken as an explicit argument. Launchers execute
//! plans; they never re-derive strategy on their own.

use reikna_device::ArchCode;

use crate::tuning::Tunables;
use crate::types::{Op, Precision};

/// Elements accumulated per lane in a strided reduction loop, chosen by
/// element width so each lane moves roughly the same number of bytes.
pub fn work_per_lane(elem_bytes: usize) -> u32 {
    if elem_bytes >= 8 {
        2
    } else if elem_bytes >= 4 {
        4
    } else {
        8
    }
}

/// Reduction strategy for one dot-family call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotKernel {
    /// One wavefront per batch element; no workspace protocol.
    WavePerBatch,
    /// The whole vector fits one group; phase 2 is skipped.
    SingleGroup,
    /// Architecture-specialized unrolled-by-4 map phase.
    Unrolled4,
    /// Generic two-phase reduction through the scratch buffer.
    TwoPhase,
}

/// How the map phase walks the operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotLoad {
    Strided,
    Unit,
    /// Unit increment, two elements per step (4-byte-and-smaller types).
    UnitPaired,
    /// x aliases y: squared-magnitude loads, half the traffic.
    SelfMagnitude,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotPlan {
    pub kernel: DotKernel,
    pub load: DotLoad,
    /// Lanes per group (x dimension).
    pub group: u32,
    /// Batch rows per group (wave-per-batch kernel only).
    pub group_y: u32,
    /// Elements accumulated per lane before the tree reduction.
    pub work: u32,
    /// Grid extent along the reduction axis.
    pub groups_per_batch: u32,
}

fn ceil_div(n: i64, d: i64) -> i64 {
    (n + d - 1) / d
}

pub fn select_dot(
    precision: Precision,
    n: i64,
    batch_count: i32,
    unit_inc: bool,
    aliased: bool,
    arch: ArchCode,
    tun: &Tunables,
) -> DotPlan {
    let d = &tun.dot;
    let load = if aliased {
        DotLoad::SelfMagnitude
    } else if unit_inc && precision.elem_bytes() <= 4 {
        DotLoad::UnitPaired
    } else if unit_inc {
        DotLoad::Unit
    } else {
        DotLoad::Strided
    };

    if n <= d.wave_per_batch_max_n && batch_count >= d.wave_per_batch_min_batch {
        return DotPlan {
            kernel: DotKernel::WavePerBatch,
            // the wavefront kernel walks elements one at a time
            load: if aliased { DotLoad::SelfMagnitude } else { DotLoad::Strided },
            group: 0, // wavefront width, taken from the device at launch
            group_y: 4,
            work: 1,
            groups_per_batch: 0,
        };
    }

    if n <= d.single_group_threshold.get(precision) {
        return DotPlan {
            kernel: DotKernel::SingleGroup,
            load,
            group: d.single_group_size,
            group_y: 1,
            work: d.single_group_work,
            groups_per_batch: 1,
        };
    }

    let real_full = matches!(precision, Precision::F32 | Precision::F64);
    if arch == ArchCode(d.unrolled_arch) && real_full && n > d.unrolled_min_n && !aliased {
        let group = d.single_group_size;
        let work = 4;
        return DotPlan {
            kernel: DotKernel::Unrolled4,
            load: if unit_inc { DotLoad::Unit } else { DotLoad::Strided },
            group,
            group_y: 1,
            work,
            groups_per_batch: ceil_div(n, group as i64 * work as i64) as u32,
        };
    }

    let work = work_per_lane(precision.elem_bytes());
    DotPlan {
        kernel: DotKernel::TwoPhase,
        load,
        group: d.group_size,
        group_y: 1,
        work,
        groups_per_batch: ceil_div(n, d.group_size as i64 * work as i64) as u32,
    }
}

/// Scratch bytes one dot call needs: per-group partials in the
/// accumulator type plus, when the result lands in host memory, a
/// device-side staging tail for the final values.
pub fn dot_workspace_bytes(
    plan: &DotPlan,
    acc_bytes: usize,
    elem_bytes: usize,
    batch_count: i32,
    host_result: bool,
) -> usize {
    let batches = batch_count.max(0) as usize;
    let partials = match plan.kernel {
        DotKernel::WavePerBatch => 0,
        // one group per batch element writes results directly
        _ if plan.groups_per_batch <= 1 => 0,
        _ => plan.groups_per_batch as usize * batches,
    };
    let tail = if host_result { batches * elem_bytes } else { 0 };
    partials * acc_bytes + crate::handle::align8(tail)
}

/// Tiling strategy for one gemv call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemvKernel {
    /// Non-transpose, tiny matrix, high batch count: one lane row per
    /// output, several batch elements per group, whole x staged.
    NSmallBatched,
    /// Non-transpose, four row-blocks per lane, column groups of four.
    NTiled,
    /// Non-transpose single-row variant for the widest element type.
    NTiledNarrow,
    /// Non-transpose double-buffered square tiling; atomic y updates.
    NDoubleBuffered,
    /// Transpose, whole x staged in group scratch (m ≤ small_m_max).
    TSharedX,
    /// Transpose, skinny n: two-phase through the scratch buffer.
    TTwoPhase,
    /// Transpose, one group per output column.
    TGroupPerColumn,
    /// Transpose double-buffered square tiling; atomic y updates.
    TDoubleBuffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemvPlan {
    pub kernel: GemvKernel,
    pub group: (u32, u32),
    /// Elements per lane (double-buffered and two-phase kernels).
    pub work: u32,
    /// Grid extent along the reduced axis for the two-phase kernel.
    pub groups_per_batch: u32,
}

pub fn select_gemv(
    precision: Precision,
    op: Op,
    m: i64,
    n: i64,
    batch_count: i32,
    arch: ArchCode,
    tun: &Tunables,
) -> GemvPlan {
    let g = &tun.gemv;
    let tile = g.double_buffer_tile as i64;
    let db_ok = matches!(precision, Precision::F32 | Precision::F64)
        && arch == ArchCode(g.double_buffer_arch)
        && m == n
        && m > g.double_buffer_min
        && m % tile == 0;

    // column/row blocks split across grid.y in the double-buffered tilings
    let db_split = (m / tile).clamp(1, 8) as u32;

    if !op.is_transposed() {
        if arch == ArchCode(g.small_mn_arch)
            && m <= g.small_mn_max
            && n <= g.small_mn_max
            && batch_count >= g.small_mn_min_batch
        {
            return GemvPlan {
                kernel: GemvKernel::NSmallBatched,
                group: (g.small_mn_max as u32, 8),
                work: 1,
                groups_per_batch: 0,
            };
        }
        if db_ok {
            let gy = g.double_buffer_group_y;
            return GemvPlan {
                kernel: GemvKernel::NDoubleBuffered,
                group: (g.double_buffer_tile, gy),
                work: g.double_buffer_tile / (2 * gy),
                groups_per_batch: db_split,
            };
        }
        if precision == Precision::C64 {
            // register pressure rules out the four-row variant
            return GemvPlan {
                kernel: GemvKernel::NTiledNarrow,
                group: g.n_group,
                work: 1,
                groups_per_batch: 0,
            };
        }
        return GemvPlan {
            kernel: GemvKernel::NTiled,
            group: g.n_group,
            work: 4,
            groups_per_batch: 0,
        };
    }

    if m <= g.small_m_max {
        return GemvPlan {
            kernel: GemvKernel::TSharedX,
            group: (g.t_group_size, 1),
            work: 1,
            groups_per_batch: 0,
        };
    }
    if n <= g.skinny_max_n && m >= g.skinny_min_m {
        let work = work_per_lane(precision.elem_bytes());
        let per_group = g.skinny_group_size as i64 * work as i64;
        return GemvPlan {
            kernel: GemvKernel::TTwoPhase,
            group: (g.skinny_group_size, 1),
            work,
            groups_per_batch: ceil_div(m, per_group) as u32,
        };
    }
    if db_ok {
        let gy = g.double_buffer_group_y;
        return GemvPlan {
            kernel: GemvKernel::TDoubleBuffered,
            group: (g.double_buffer_tile, gy),
            work: g.double_buffer_tile / (2 * gy),
            groups_per_batch: db_split,
        };
    }
    GemvPlan {
        kernel: GemvKernel::TGroupPerColumn,
        group: (g.t_group_size, 1),
        work: 1,
        groups_per_batch: 0,
    }
}

/// Scratch bytes a gemv call needs (two-phase transpose kernel only).
pub fn gemv_workspace_bytes(plan: &GemvPlan, acc_bytes: usize, n: i64, batch_count: i32) -> usize {
    match plan.kernel {
        GemvKernel::TTwoPhase => {
            plan.groups_per_batch as usize * n.max(0) as usize * batch_count.max(0) as usize
                * acc_bytes
        }
        _ => 0,
    }
}

/// Tiling strategy for one ger-family call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GerKernel {
    /// Square double-buffered tiling, tile-disjoint writes.
    DoubleBuffered,
    /// Column per group, two rows per lane (wide-wave architecture).
    PairedColumn,
    /// Column per group, strided rows per lane.
    GroupPerColumn,
    /// Generic tile with x/y staged in group scratch.
    Tiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GerPlan {
    pub kernel: GerKernel,
    pub group: (u32, u32),
    pub work: u32,
}

pub fn select_ger(
    precision: Precision,
    m: i64,
    n: i64,
    arch: ArchCode,
    tun: &Tunables,
) -> GerPlan {
    let g = &tun.ger;
    let db_eligible = matches!(
        precision,
        Precision::F32 | Precision::F64 | Precision::C32
    ) && arch == ArchCode(g.double_buffer_arch)
        && m == n
        && m > g.double_buffer_min;
    if db_eligible {
        let tile = if precision == Precision::F32 {
            g.db_tile_f32
        } else {
            g.db_tile
        };
        if m % tile.0 as i64 == 0 {
            return GerPlan {
                kernel: GerKernel::DoubleBuffered,
                group: tile,
                work: tile.0 / (2 * tile.1),
            };
        }
    }
    if precision == Precision::F32 && m > g.col_kernel_min_m {
        if arch == ArchCode(g.paired_arch) {
            return GerPlan {
                kernel: GerKernel::PairedColumn,
                group: (g.paired_group_size, 1),
                work: 2,
            };
        }
        return GerPlan {
            kernel: GerKernel::GroupPerColumn,
            group: (g.col_group_size, 1),
            work: 1,
        };
    }
    GerPlan {
        kernel: GerKernel::Tiled,
        group: g.tile,
        work: g.work,
    }
}
