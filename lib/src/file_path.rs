// Copyright 2024 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Path normalisation and validation.
//!
//! Every path stored in the entity tables (and every symlink target) goes
//! through [`FilePath::parse`] first, so stored paths are always absolute,
//! single-slash-separated and free of trailing separators. Parsing is
//! idempotent: re-parsing a normalised path yields the same path.

use std::fmt;
use std::fmt::Debug;
use std::fmt::Formatter;

use thiserror::Error;

/// Maximum accepted path length, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilePathError {
    /// The input was empty.
    #[error("path is empty")]
    Empty,
    /// The input exceeds [`MAX_PATH_LEN`] bytes.
    #[error("path is {len} bytes long, which exceeds the limit of {MAX_PATH_LEN}")]
    TooLong { len: usize },
    /// The input contains a NUL byte.
    #[error("path contains a NUL byte")]
    NullByte,
    /// The input contains an ASCII control character other than NUL.
    #[error("path contains control character {byte:#04x}")]
    ControlChar { byte: u8 },
    /// The input contains a character that is invalid in Windows file names.
    #[error("path contains {chr:?}, which is not a valid file name character on Windows")]
    WindowsUnsafe { chr: char },
}

/// A normalised absolute path inside a repository's virtual filesystem.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct FilePath {
    value: String,
}

impl FilePath {
    /// The root path `/`.
    pub fn root() -> Self {
        FilePath {
            value: String::from("/"),
        }
    }

    /// Validates and normalises `input`:
    ///
    /// - rejects empty input, input longer than [`MAX_PATH_LEN`] bytes,
    ///   control characters (NUL reported separately), and the characters
    ///   `< > : " | ? *`;
    /// - prepends `/` if missing, collapses runs of `/`, and strips any
    ///   trailing `/` (the root stays `/`).
    pub fn parse(input: &str) -> Result<Self, FilePathError> {
        if input.is_empty() {
            return Err(FilePathError::Empty);
        }
        if input.len() > MAX_PATH_LEN {
            return Err(FilePathError::TooLong { len: input.len() });
        }
        for byte in input.bytes() {
            if byte == 0 {
                return Err(FilePathError::NullByte);
            }
            if byte < 0x20 {
                return Err(FilePathError::ControlChar { byte });
            }
        }
        if let Some(chr) = input
            .chars()
            .find(|chr| matches!(chr, '<' | '>' | ':' | '"' | '|' | '?' | '*'))
        {
            return Err(FilePathError::WindowsUnsafe { chr });
        }

        let mut value = String::with_capacity(input.len() + 1);
        for segment in input.split('/').filter(|segment| !segment.is_empty()) {
            value.push('/');
            value.push_str(segment);
        }
        if value.is_empty() {
            value.push('/');
        }
        Ok(FilePath { value })
    }

    pub fn is_root(&self) -> bool {
        self.value == "/"
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl Debug for FilePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.value)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for FilePath {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
