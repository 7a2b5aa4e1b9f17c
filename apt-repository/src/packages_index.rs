// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Packages` index files.

A `Packages` file lists every binary package published for one
(distribution, component, architecture) tuple. [PackagesIndex] holds
the records keyed by package name so merging a new upload replaces any
prior version of the same package, and serialization is deterministic.
*/

use {
    crate::control::{self, PackageRecord},
    std::{collections::BTreeMap, fmt},
};

/// An in-memory `Packages` index.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackagesIndex {
    records: BTreeMap<String, PackageRecord>,
}

impl PackagesIndex {
    /// Parse the text content of a `Packages` file.
    pub fn parse(text: &str) -> Self {
        Self {
            records: control::parse_packages(text),
        }
    }

    /// Insert a record, replacing any existing record with the same
    /// package name.
    pub fn merge(&mut self, record: PackageRecord) {
        self.records.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for PackagesIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.records.values() {
            write!(f, "{}", record)?;
        }

        Ok(())
    }
}
