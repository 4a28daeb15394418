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

use std::fs;

use sieve_proxy::filtering::FilterSet;
use tempfile::tempdir;

#[test]
fn matches_literal_substrings_case_sensitively() {
    let filters = FilterSet::new(["Paris Hilton", "Norrköping"]);

    assert!(filters.contains("www.example.com/Paris Hilton/news.html"));
    assert!(filters.contains("Welcome to Norrköping!"));
    assert!(!filters.contains("paris hilton")); // case differs
    assert!(!filters.contains("completely unrelated"));
}

#[test]
fn empty_set_matches_nothing() {
    let filters = FilterSet::default();
    assert!(filters.is_empty());
    assert!(!filters.contains("anything at all"));
}

#[test]
fn loads_one_filter_per_line_skipping_blanks() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("filters.txt");
    fs::write(&path, "SpongeBob\n\nBritney Spears\n").expect("write");

    let filters = FilterSet::from_file(&path).expect("loads");
    assert_eq!(filters.len(), 2);
    assert!(filters.contains("more SpongeBob reruns"));
    assert!(filters.contains("Britney Spears tour dates"));
}

#[test]
fn missing_filter_file_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let err = FilterSet::from_file(dir.path().join("nope.txt")).expect_err("missing file");
    assert!(err.to_string().contains("failed to read filter file"));
}
