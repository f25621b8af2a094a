//! Fuzz test for the time shift expression parser
//!
//! This fuzz target feeds arbitrary byte sequences to the shift parser
//! to find:
//! - Panics or crashes
//! - Infinite loops in the tokenizer
//! - Arithmetic overflow in unit conversion
//!
//! Run with: cargo +nightly fuzz run shift_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use satchel_core::time::{time_shift_to_params, ttl_from_expiration};
use satchel_core::Expires;

fuzz_target!(|data: &[u8]| {
    // The parser takes strings; skip inputs that are not UTF-8
    if let Ok(input) = std::str::from_utf8(data) {
        match time_shift_to_params(input) {
            Ok(params) => {
                // A successful parse consumed at least one quantity and
                // one unit word
                assert!(
                    input.bytes().any(|b| b.is_ascii_digit()),
                    "Parsed expression should contain a quantity"
                );
                assert!(
                    input.chars().any(|c| c.is_ascii_alphabetic()),
                    "Parsed expression should contain a unit word"
                );

                // Conversion saturates instead of overflowing
                let total = params.to_seconds();

                // A parseable expression is a relative one, so its TTL
                // is the clamped total and never negative
                let ttl = ttl_from_expiration(&Expires::from(input))
                    .expect("Parseable shift should resolve to a TTL");
                assert_eq!(ttl, total.max(0), "TTL should be the clamped total");
            }
            Err(err) => {
                // Errors should carry the offending expression
                assert!(!err.to_string().is_empty(), "Error display should not be empty");
            }
        }
    }
});
