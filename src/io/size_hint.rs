/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Bounds on the number of bytes a stream will yield.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SizeHint {
    lower: u64,
    upper: Option<u64>,
}

impl SizeHint {
    /// A hint for a stream whose exact size is known.
    pub fn exact(size: u64) -> Self {
        Self {
            lower: size,
            upper: Some(size),
        }
    }

    /// A hint bounded only from below.
    pub fn at_least(lower: u64) -> Self {
        Self { lower, upper: None }
    }

    /// Lower bound on the remaining length.
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// Upper bound on the remaining length, if known.
    pub fn upper(&self) -> Option<u64> {
        self.upper
    }
}
