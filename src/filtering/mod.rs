/* SIEVE Proxy (AGPL-3.0)

Copyright (C) 2026 - SIEVE Contributors

This program is free software: you can redistribute it and/or modify
it under the terms of the GNU Affero General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU Affero General Public License for more details.

You should have received a copy of the GNU Affero General Public License
along with this program.  If not, see <https://www.gnu.org/licenses/>.

*/

use std::path::Path;

use anyhow::{Context, Result};

/// Immutable ordered set of blocked substrings, shared read-only by every session.
///
/// Matching is literal and case-sensitive; no regex, no normalization. The scan
/// is O(filters x text) which is acceptable because filter lists are short and
/// a session consults the set at most twice (URL, body).
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    filters: Vec<String>,
}

impl FilterSet {
    pub fn new<I, S>(filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            filters: filters.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads a filter set from a file containing one filter per line.
    ///
    /// Blank lines are skipped; everything else is taken verbatim, including
    /// leading/trailing whitespace other than the line terminator.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read filter file: {}", path.display()))?;
        Ok(Self::new(
            raw.lines().filter(|line| !line.is_empty()).map(str::to_owned),
        ))
    }

    /// Returns true when any filter is a literal substring of `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.filters.iter().any(|filter| text.contains(filter))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(String::as_str)
    }
}
