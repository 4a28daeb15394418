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

//! SIEVE: an intercepting HTTP/1.x forward proxy that blocks requests and
//! responses containing configured substrings, redirecting the browser to a
//! landing page instead.

pub mod app;
pub mod config;
pub mod filtering;
pub mod proxy;
pub mod telemetry;
pub mod utils;
