//! Element type conversion.
//!
//! Conversions are looked up in a table keyed by `(source, target)` element
//! type. Each entry converts a whole data buffer element by element:
//!
//! - integers narrow by keeping the low-order bits and widen by sign- or
//!   zero-extension according to the source kind (`as` semantics);
//!   signed to unsigned is not supported;
//! - floats convert per IEEE-754, including half precision;
//! - complex types convert their real and imaginary parts independently;
//! - real to complex pairs each value with a zero imaginary part;
//! - complex to real keeps the real part.

use crate::{
    array::RawArray,
    eltype::{ElementKind, ElementType},
    error::Warning,
    ra::Element,
};
use half::f16;
use num_complex::Complex;
use num_traits::{AsPrimitive, Zero};
use std::{collections::HashMap, collections::TryReserveError, mem, sync::OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

type ConvertFn = fn(&[u8]) -> Result<Vec<u8>, TryReserveError>;
type ConversionTable = HashMap<(ElementType, ElementType), ConvertFn>;

/// Result of a successful [`RawArray::convert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// The array already had the target type.
    Unchanged,
    /// The data was converted.
    Converted {
        /// Lossy aspects of the conversion.
        warnings: Vec<Warning>,
    },
}

/// An error converting an array to another element type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    /// User-defined elements must be decoded by the user.
    #[error("cannot convert to user-defined type {0}")]
    UserTarget(ElementType),
    /// The data must be decompressed first.
    #[error("conversion of compressed data is not supported")]
    Compressed,
    /// No rule converts between the two types.
    #[error("no conversion from {from} to {to}")]
    Unsupported {
        /// Source type.
        from: ElementType,
        /// Target type.
        to: ElementType,
    },
    /// The output buffer could not be allocated.
    #[error("unable to allocate {0} bytes for converted data")]
    Allocation(u64),
}

/// Returns `true` if data of type `from` can be converted to type `to`.
pub fn is_supported(from: ElementType, to: ElementType) -> bool {
    from == to || conversions().contains_key(&(from, to))
}

impl RawArray {
    /// Converts the data to `target` in place.
    ///
    /// On success the element type and data are replaced; a unified array
    /// becomes split.
    ///
    /// # Example
    ///
    /// ```
    /// use rawarray::{ConvertOutcome, RawArray};
    ///
    /// let mut arr = RawArray::from_elements(&[3], &[0u8, 255, 128])?;
    /// arr.convert("i32".parse()?)?;
    /// assert_eq!(arr.to_elements::<i32>(), Some(vec![0, 255, 128]));
    /// # Ok::<_, Box<dyn std::error::Error>>(())
    /// ```
    pub fn convert(&mut self, target: ElementType) -> Result<ConvertOutcome, ConvertError> {
        let source = self.eltype();
        if target.kind == ElementKind::User {
            return Err(ConvertError::UserTarget(target));
        }
        if target == source {
            debug!(eltype = %source, "already the requested type");
            return Ok(ConvertOutcome::Unchanged);
        }
        if self.is_compressed() {
            return Err(ConvertError::Compressed);
        }
        let convert = conversions()
            .get(&(source, target))
            .ok_or(ConvertError::Unsupported { from: source, to: target })?;

        let mut warnings = Vec::new();
        if source.kind == ElementKind::Complex && target.kind != ElementKind::Complex {
            warnings.push(Warning::DiscardsImaginary { from: source, to: target });
        }
        if target.width < source.width {
            warnings.push(Warning::Narrowing { from: source, to: target });
        }
        for warning in &warnings {
            warn!("{warning}");
        }

        let data = convert(self.data()).map_err(|_| {
            ConvertError::Allocation(self.num_elements().saturating_mul(target.width))
        })?;
        debug!(from = %source, to = %target, bytes = data.len(), "converted");
        let flags = self.flags();
        self.replace_data(target, flags, data);
        Ok(ConvertOutcome::Converted { warnings })
    }
}

fn conversions() -> &'static ConversionTable {
    static TABLE: OnceLock<ConversionTable> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Applies `f` to every element of `src`, which holds packed `S` values in
/// host byte order.
fn map_elements<S, D>(src: &[u8], f: impl Fn(S) -> D) -> Result<Vec<u8>, TryReserveError>
where
    S: Element,
    D: Element,
{
    let count = src.len() / mem::size_of::<S>();
    let mut out = Vec::new();
    out.try_reserve_exact(count * mem::size_of::<D>())?;
    for chunk in src.chunks_exact(mem::size_of::<S>()) {
        let value = f(bytemuck::pod_read_unaligned(chunk));
        out.extend_from_slice(bytemuck::bytes_of(&value));
    }
    Ok(out)
}

fn cast<S, D>(src: &[u8]) -> Result<Vec<u8>, TryReserveError>
where
    S: Element + AsPrimitive<D>,
    D: Element,
{
    map_elements(src, |v: S| v.as_())
}

fn real_to_complex<T>(src: &[u8]) -> Result<Vec<u8>, TryReserveError>
where
    T: Element + Zero,
    Complex<T>: Element,
{
    map_elements(src, |v: T| Complex::new(v, T::zero()))
}

fn complex_to_real<T>(src: &[u8]) -> Result<Vec<u8>, TryReserveError>
where
    T: Element,
    Complex<T>: Element,
{
    map_elements(src, |c: Complex<T>| c.re)
}

fn complex_cast<S, D>(src: &[u8]) -> Result<Vec<u8>, TryReserveError>
where
    S: AsPrimitive<D>,
    D: Copy + 'static,
    Complex<S>: Element,
    Complex<D>: Element,
{
    map_elements(src, |c: Complex<S>| Complex::new(c.re.as_(), c.im.as_()))
}

fn half_to_single(src: &[u8]) -> Result<Vec<u8>, TryReserveError> {
    map_elements(src, f16::to_f32)
}

fn half_to_double(src: &[u8]) -> Result<Vec<u8>, TryReserveError> {
    map_elements(src, f16::to_f64)
}

fn single_to_half(src: &[u8]) -> Result<Vec<u8>, TryReserveError> {
    map_elements(src, f16::from_f32)
}

fn double_to_half(src: &[u8]) -> Result<Vec<u8>, TryReserveError> {
    map_elements(src, f16::from_f64)
}

fn register<S: Element, D: Element>(table: &mut ConversionTable, convert: ConvertFn) {
    table.insert((S::ELEMENT_TYPE, D::ELEMENT_TYPE), convert);
}

macro_rules! casts {
    ($table:ident; $($src:ty => [$($dst:ty),+ $(,)?]);+ $(;)?) => {
        $($(register::<$src, $dst>(&mut $table, cast::<$src, $dst>);)+)+
    };
}

fn build_table() -> ConversionTable {
    let mut table = ConversionTable::new();
    casts! { table;
        i8 => [i16, i32, i64];
        i16 => [i8, i32, i64];
        i32 => [i8, i16, i64];
        i64 => [i8, i16, i32];
        u8 => [u16, u32, u64, i8, i16, i32, i64];
        u16 => [u8, u32, u64, i8, i16, i32, i64];
        u32 => [u8, u16, u64, i8, i16, i32, i64];
        u64 => [u8, u16, u32, i8, i16, i32, i64];
        f32 => [f64];
        f64 => [f32];
    }
    register::<f16, f32>(&mut table, half_to_single);
    register::<f16, f64>(&mut table, half_to_double);
    register::<f32, f16>(&mut table, single_to_half);
    register::<f64, f16>(&mut table, double_to_half);
    register::<Complex<f32>, Complex<f64>>(&mut table, complex_cast::<f32, f64>);
    register::<Complex<f64>, Complex<f32>>(&mut table, complex_cast::<f64, f32>);
    register::<f32, Complex<f32>>(&mut table, real_to_complex::<f32>);
    register::<f64, Complex<f64>>(&mut table, real_to_complex::<f64>);
    register::<Complex<f32>, f32>(&mut table, complex_to_real::<f32>);
    register::<Complex<f64>, f64>(&mut table, complex_to_real::<f64>);
    table
}
