use bytemuck::Pod;
use half::{bf16, f16};
use num_complex::{Complex32, Complex64};
use num_traits::{Num, NumAssign};

/// Element precision, the key into every tuning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    F16,
    BF16,
    F32,
    F64,
    C32,
    C64,
}

impl Precision {
    pub fn elem_bytes(self) -> usize {
        match self {
            Precision::F16 | Precision::BF16 => 2,
            Precision::F32 => 4,
            Precision::F64 | Precision::C32 => 8,
            Precision::C64 => 16,
        }
    }

    pub fn is_complex(self) -> bool {
        matches!(self, Precision::C32 | Precision::C64)
    }
}

/// Which form of the matrix participates in a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    None,
    Transpose,
    ConjTranspose,
}

impl Op {
    pub fn is_transposed(self) -> bool {
        !matches!(self, Op::None)
    }

    pub fn is_conjugated(self) -> bool {
        matches!(self, Op::ConjTranspose)
    }
}

/// Which triangle of a symmetric/Hermitian/triangular matrix is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

impl Uplo {
    pub fn is_upper(self) -> bool {
        matches!(self, Uplo::Upper)
    }
}

/// Whether a triangular matrix has an implicit unit diagonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    NonUnit,
    Unit,
}

/// A storable element type.
///
/// Kernels never do arithmetic in the storage type: loads widen to
/// [`Element::Acc`], all accumulation happens there, and stores narrow
/// back. For the four full-precision types the accumulator is the type
/// itself; for the half-precision types it is `f32`.
pub trait Element:
    Pod + Copy + PartialEq + Send + Sync + std::fmt::Debug + 'static
{
    type Acc: Scalar;
    const PRECISION: Precision;

    fn to_acc(self) -> Self::Acc;
    fn from_acc(acc: Self::Acc) -> Self;
}

/// An element type kernels can accumulate in.
pub trait Scalar: Element<Acc = Self> + Num + NumAssign + std::ops::Neg<Output = Self> {
    type Real: Scalar<Real = Self::Real> + PartialOrd;
    const COMPLEX: bool;

    fn conj(self) -> Self;
    fn re(self) -> Self::Real;
    fn im(self) -> Self::Real;
    fn from_real(re: Self::Real) -> Self;
    /// Multiply by a real factor.
    fn scale(self, r: Self::Real) -> Self;
}

macro_rules! impl_real_scalar {
    ($t:ty, $prec:expr) => {
        impl Element for $t {
            type Acc = $t;
            const PRECISION: Precision = $prec;

            #[inline]
            fn to_acc(self) -> $t {
                self
            }

            #[inline]
            fn from_acc(acc: $t) -> $t {
                acc
            }
        }

        impl Scalar for $t {
            type Real = $t;
            const COMPLEX: bool = false;

            #[inline]
            fn conj(self) -> Self {
                self
            }

            #[inline]
            fn re(self) -> Self {
                self
            }

            #[inline]
            fn im(self) -> Self {
                0.0
            }

            #[inline]
            fn from_real(re: Self) -> Self {
                re
            }

            #[inline]
            fn scale(self, r: Self) -> Self {
                self * r
            }
        }
    };
}

impl_real_scalar!(f32, Precision::F32);
impl_real_scalar!(f64, Precision::F64);

macro_rules! impl_complex_scalar {
    ($t:ty, $real:ty, $prec:expr) => {
        impl Element for $t {
            type Acc = $t;
            const PRECISION: Precision = $prec;

            #[inline]
            fn to_acc(self) -> $t {
                self
            }

            #[inline]
            fn from_acc(acc: $t) -> $t {
                acc
            }
        }

        impl Scalar for $t {
            type Real = $real;
            const COMPLEX: bool = true;

            #[inline]
            fn conj(self) -> Self {
                num_complex::Complex::conj(&self)
            }

            #[inline]
            fn re(self) -> $real {
                self.re
            }

            #[inline]
            fn im(self) -> $real {
                self.im
            }

            #[inline]
            fn from_real(re: $real) -> Self {
                Self::new(re, 0.0)
            }

            #[inline]
            fn scale(self, r: $real) -> Self {
                Self::new(self.re * r, self.im * r)
            }
        }
    };
}

impl_complex_scalar!(Complex32, f32, Precision::C32);
impl_complex_scalar!(Complex64, f64, Precision::C64);

impl Element for f16 {
    type Acc = f32;
    const PRECISION: Precision = Precision::F16;

    #[inline]
    fn to_acc(self) -> f32 {
        f32::from(self)
    }

    #[inline]
    fn from_acc(acc: f32) -> Self {
        f16::from_f32(acc)
    }
}

impl Element for bf16 {
    type Acc = f32;
    const PRECISION: Precision = Precision::BF16;

    #[inline]
    fn to_acc(self) -> f32 {
        f32::from(self)
    }

    #[inline]
    fn from_acc(acc: f32) -> Self {
        bf16::from_f32(acc)
    }
}
