/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

pub(crate) mod chunked;
pub(crate) mod post_policy;
pub(crate) mod v4;
