// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian control file parsing.

Binary packages describe themselves via an RFC 822 style `control` file
of `Field: value` lines. The `Description` field may continue across
subsequent lines, each introduced by a single space. The same syntax is
used by `Packages` index files, where records are separated by blank
lines.

[PackageRecord] models a single record. Parsing is lenient: lines that
don't split on `: ` are skipped, unknown fields are ignored and an
unparseable `Size` falls back to 0 with a warning, so one odd package
doesn't abort a whole repository update.
*/

use {
    log::warn,
    std::{collections::BTreeMap, fmt},
};

/// Metadata describing a single binary package.
///
/// Field names mirror the control file fields they are parsed from.
/// `filename` and the checksum fields are only populated for records in
/// a `Packages` index, not for the control file inside a `.deb`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: String,
    pub installed_size: String,
    pub depends: String,
    pub filename: String,
    pub size: u64,
    pub md5sum: String,
    pub sha1: String,
    pub sha256: String,
    pub section: String,
    pub priority: String,
    pub description: String,
}

impl PackageRecord {
    /// Parse a single control file into a record.
    ///
    /// Blank lines end field accumulation but do not terminate the
    /// record: the whole input contributes to one result.
    pub fn parse(text: &str) -> Self {
        let mut parser = RecordParser::default();

        for line in text.lines() {
            parser.write_line(line, false);
        }

        parser.flush_continuation();
        parser.record
    }

    fn apply_field(&mut self, name: &str, value: &str) {
        match name {
            "Package" => self.name = value.to_string(),
            "Version" => self.version = value.to_string(),
            "Architecture" => self.architecture = value.to_string(),
            "Maintainer" => self.maintainer = value.to_string(),
            "Installed-Size" => self.installed_size = value.to_string(),
            "Depends" => self.depends = value.to_string(),
            "Filename" => self.filename = value.to_string(),
            "Size" => {
                self.size = match value.parse::<u64>() {
                    Ok(size) => size,
                    Err(_) => {
                        warn!("unparseable Size field {:?}; recording 0", value);
                        0
                    }
                }
            }
            "MD5sum" => self.md5sum = value.to_string(),
            "SHA1" => self.sha1 = value.to_string(),
            "SHA256" => self.sha256 = value.to_string(),
            "Section" => self.section = value.to_string(),
            "Priority" => self.priority = value.to_string(),
            "Description" => self.description = value.to_string(),
            // Unknown fields are preserved nowhere: indexes are rebuilt
            // from the fields this tool manages.
            _ => {}
        }
    }
}

impl fmt::Display for PackageRecord {
    /// Emit the record as a `Packages` index block.
    ///
    /// Mandatory fields always appear; optional fields only when
    /// populated. Continuation lines of the description are re-indented
    /// with a single space. A trailing blank line terminates the block
    /// so blocks can be concatenated directly.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Package: {}", self.name)?;
        writeln!(f, "Version: {}", self.version)?;
        writeln!(f, "Architecture: {}", self.architecture)?;
        writeln!(f, "Maintainer: {}", self.maintainer)?;

        if !self.installed_size.is_empty() {
            writeln!(f, "Installed-Size: {}", self.installed_size)?;
        }
        if !self.depends.is_empty() {
            writeln!(f, "Depends: {}", self.depends)?;
        }

        writeln!(f, "Filename: {}", self.filename)?;
        writeln!(f, "Size: {}", self.size)?;
        writeln!(f, "MD5sum: {}", self.md5sum)?;
        writeln!(f, "SHA1: {}", self.sha1)?;
        writeln!(f, "SHA256: {}", self.sha256)?;

        if !self.section.is_empty() {
            writeln!(f, "Section: {}", self.section)?;
        }
        if !self.priority.is_empty() {
            writeln!(f, "Priority: {}", self.priority)?;
        }
        if !self.description.is_empty() {
            let mut lines = self.description.lines();
            writeln!(f, "Description: {}", lines.next().unwrap_or_default())?;
            for line in lines {
                writeln!(f, " {}", line)?;
            }
        }

        writeln!(f)
    }
}

/// Parse the concatenated records of a `Packages` index.
///
/// Returns records keyed by package name. A later record for the same
/// name replaces an earlier one.
pub fn parse_packages(text: &str) -> BTreeMap<String, PackageRecord> {
    let mut records = BTreeMap::new();
    let mut parser = RecordParser::default();

    for line in text.lines() {
        if let Some(record) = parser.write_line(line, true) {
            records.insert(record.name.clone(), record);
        }
    }

    if let Some(record) = parser.finish() {
        records.insert(record.name.clone(), record);
    }

    records
}

/// Line oriented state machine accumulating a [PackageRecord].
#[derive(Debug, Default)]
struct RecordParser {
    record: PackageRecord,
    last_field: String,
    continuation: Vec<String>,
}

impl RecordParser {
    /// Feed one line.
    ///
    /// In multi-record mode (`flush_on_blank`), a blank line terminates
    /// the current record and returns it if it named a package.
    fn write_line(&mut self, line: &str, flush_on_blank: bool) -> Option<PackageRecord> {
        // Continuation lines are only honored for Description. Exactly
        // one leading space is stripped; deeper indentation is content.
        if line.starts_with(' ') && self.last_field == "Description" {
            self.continuation.push(line[1..].to_string());
            return None;
        }

        self.flush_continuation();

        if line.is_empty() {
            self.last_field.clear();

            if flush_on_blank {
                let record = std::mem::take(&mut self.record);
                if !record.name.is_empty() {
                    return Some(record);
                }
            }

            return None;
        }

        let (name, value) = match line.split_once(": ") {
            Some(parts) => parts,
            None => return None,
        };

        self.last_field = name.to_string();
        self.record.apply_field(name, value);

        None
    }

    /// Terminate parsing, returning a trailing record not followed by a
    /// blank line.
    fn finish(mut self) -> Option<PackageRecord> {
        self.flush_continuation();

        if self.record.name.is_empty() {
            None
        } else {
            Some(self.record)
        }
    }

    fn flush_continuation(&mut self) {
        if self.continuation.is_empty() || self.last_field != "Description" {
            return;
        }

        let joined = self.continuation.join("\n");
        self.continuation.clear();

        if self.record.description.is_empty() {
            self.record.description = joined;
        } else {
            self.record.description = format!("{}\n{}", self.record.description, joined);
        }
    }
}
