/*
 * Copyright the s3-object-client contributors.
 * SPDX-License-Identifier: Apache-2.0
 */

mod path_body;
pub(crate) mod part_reader;
mod size_hint;
mod stream;

// re-exports
pub use self::path_body::PathBodyBuilder;
pub use self::size_hint::SizeHint;
pub use self::stream::InputStream;
