//! Count-key conversion from kernel form to client form.
//!
//! The kernel emits count keys hex-encoded from the little-endian classical
//! register (clbit 0 is the least significant bit). Clients expect
//! fixed-width bitstrings of length `num_clbits`, most significant bit
//! first, so `"0x3"` with two clbits becomes `"11"` and `"0x1"` becomes
//! `"01"`.

use serde_json::{Map, Value};

use crate::error::{QpuError, QpuResult};

/// Rewrite `results[0].data.counts` keys into fixed-width bitstrings.
pub fn to_bitstrings(result: &mut Value, num_clbits: usize) -> QpuResult<()> {
    if num_clbits > 128 {
        return Err(QpuError::MalformedResult(format!(
            "classical register of {num_clbits} bits exceeds the conversion width"
        )));
    }
    let counts = result
        .pointer_mut("/results/0/data/counts")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| QpuError::MalformedResult("no counts object in result".to_string()))?;

    let mut converted = Map::new();
    for (key, value) in std::mem::take(counts) {
        let bitstring = hex_to_bitstring(&key, num_clbits)?;
        let n = value.as_u64().ok_or_else(|| {
            QpuError::MalformedResult(format!("count for {key} is not an integer"))
        })?;
        // Keys can collide once truncated to the register width.
        let slot = converted.entry(bitstring).or_insert(Value::from(0u64));
        *slot = Value::from(slot.as_u64().unwrap_or(0) + n);
    }
    *counts = converted;
    Ok(())
}

/// Decode one hex count key into an MSB-first bitstring of `width` bits.
fn hex_to_bitstring(key: &str, width: usize) -> QpuResult<String> {
    let digits = key
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let value = u128::from_str_radix(digits, 16)
        .map_err(|_| QpuError::MalformedResult(format!("count key {key} is not hex")))?;

    Ok((0..width)
        .rev()
        .map(|bit| if value >> bit & 1 == 1 { '1' } else { '0' })
        .collect())
}
