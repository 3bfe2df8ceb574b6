//! Canonical integer quantities and conversion to/from the cluster's native
//! [`Quantity`] wire type.
//!
//! All arithmetic in this crate happens in millicores (CPU) and bytes
//! (memory) to avoid the rounding drift that repeated float round-tripping
//! through string quantities would introduce. Conversion to [`Quantity`]
//! happens only at the surface, when a value is about to be serialized into
//! a patch.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::fmt;

/// One MiB in bytes, used to translate the metrics provider's
/// floating-point MiB samples into canonical byte counts.
pub const MIB: i64 = 1024 * 1024;

/// CPU amount in millicores (1000m == 1 vCPU core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Millicores(pub i64);

/// Memory amount in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Bytes(pub i64);

impl Millicores {
    pub const ZERO: Millicores = Millicores(0);

    pub fn from_cores_f64(cores: f64) -> Self {
        Millicores((cores * 1000.0).round() as i64)
    }

    pub fn as_cores_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Multiply by a floating-point factor, flooring the result (per the
    /// request-sizing rule in the resource calculator).
    pub fn scale_floor(self, factor: f64) -> Self {
        Millicores((self.0 as f64 * factor).floor() as i64)
    }

    pub fn scale_ceil(self, factor: f64) -> Self {
        Millicores((self.0 as f64 * factor).ceil() as i64)
    }

    pub fn saturating_add(self, other: i64) -> Self {
        Millicores(self.0.saturating_add(other))
    }
}

impl Bytes {
    pub const ZERO: Bytes = Bytes(0);

    pub fn from_mib_f64(mib: f64) -> Self {
        Bytes((mib * MIB as f64).round() as i64)
    }

    pub fn as_mib_f64(self) -> f64 {
        self.0 as f64 / MIB as f64
    }

    pub fn scale_floor(self, factor: f64) -> Self {
        Bytes((self.0 as f64 * factor).floor() as i64)
    }

    pub fn scale_ceil(self, factor: f64) -> Self {
        Bytes((self.0 as f64 * factor).ceil() as i64)
    }

    pub fn saturating_add(self, other: i64) -> Self {
        Bytes(self.0.saturating_add(other))
    }
}

impl fmt::Display for Millicores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Millicores> for Quantity {
    fn from(value: Millicores) -> Self {
        Quantity(format!("{}m", value.0))
    }
}

impl From<Bytes> for Quantity {
    fn from(value: Bytes) -> Self {
        Quantity(format!("{}Mi", value.0 / MIB))
    }
}

/// Parse a CPU [`Quantity`] (either `"250m"` or a bare core count like
/// `"1"` / `"0.5"`) into canonical millicores.
///
/// Unparsable quantities are treated as zero; the decision engine already
/// treats a zero base as "scale up from nothing", which is the safe
/// direction for a corrupt or unexpected quantity string.
pub fn parse_cpu(q: &Quantity) -> Millicores {
    let s = q.0.trim();
    if let Some(milli) = s.strip_suffix('m') {
        Millicores(milli.parse::<f64>().unwrap_or(0.0).round() as i64)
    } else {
        Millicores((s.parse::<f64>().unwrap_or(0.0) * 1000.0).round() as i64)
    }
}

/// Parse a memory [`Quantity`] into canonical bytes, understanding the
/// binary (`Ki`/`Mi`/`Gi`/`Ti`) and decimal (`k`/`M`/`G`/`T`) suffixes.
pub fn parse_memory(q: &Quantity) -> Bytes {
    let s = q.0.trim();
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0_f64.powi(4)),
        ("k", 1_000.0),
        ("M", 1_000_000.0),
        ("G", 1_000_000_000.0),
        ("T", 1_000_000_000_000.0),
    ];
    for (suffix, factor) in SUFFIXES {
        if let Some(num) = s.strip_suffix(suffix) {
            return Bytes((num.parse::<f64>().unwrap_or(0.0) * factor).round() as i64);
        }
    }
    Bytes(s.parse::<f64>().unwrap_or(0.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millicore_suffix() {
        assert_eq!(parse_cpu(&Quantity("250m".into())), Millicores(250));
    }

    #[test]
    fn parses_bare_core_count() {
        assert_eq!(parse_cpu(&Quantity("1".into())), Millicores(1000));
        assert_eq!(parse_cpu(&Quantity("0.5".into())), Millicores(500));
    }

    #[test]
    fn parses_binary_memory_suffixes() {
        assert_eq!(parse_memory(&Quantity("256Mi".into())), Bytes(256 * MIB));
        assert_eq!(parse_memory(&Quantity("2Gi".into())), Bytes(2 * 1024 * MIB));
    }

    #[test]
    fn formats_round_trip_for_whole_units() {
        let b = Bytes(512 * MIB);
        let q: Quantity = b.into();
        assert_eq!(parse_memory(&q), b);
    }

    #[test]
    fn unparsable_quantity_is_zero_not_an_error() {
        assert_eq!(parse_cpu(&Quantity("garbage".into())), Millicores(0));
    }
}
