// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` manifest files.

A `Release` file sits at `dists/<distribution>/Release` and pairs a
handful of descriptive scalar fields with checksum sections listing
every index file under that distribution. Four digest algorithms are
recorded per file, each in its own section, so clients of differing
vintages can verify downloads.

[ReleaseFile] parses and serializes this format. Entries accumulate
across publishes: paths not re-staged in the current run keep the
digests recorded by an earlier one.
*/

use {
    chrono::Utc,
    digest::Digest,
    log::debug,
    std::{collections::BTreeMap, fmt},
};

/// Date format used by `Release` files.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// `Origin` value stamped onto every emitted manifest.
pub const RELEASE_ORIGIN: &str = "APT Repository";

/// `Label` value stamped onto every emitted manifest.
pub const RELEASE_LABEL: &str = "apt-repository";

const DEFAULT_DESCRIPTION: &str = "APT package repository";

/// A hashing algorithm used by `Release` checksum sections.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    /// All variants, in the order sections appear in a manifest.
    pub fn all() -> [Self; 4] {
        [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512]
    }

    /// Section label as it appears in a `Release` file.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

/// Digest and size recorded for one indexed file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DigestEntry {
    /// Lowercase hex digest of the file content.
    pub digest: String,
    /// File size in bytes.
    pub size: u64,
}

/// All content digests of a byte sequence, computed in one pass.
pub struct ContentDigests {
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
}

/// Feeds content into all digest algorithms a manifest records.
pub struct MultiDigester {
    md5: md5::Md5,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
    sha512: sha2::Sha512,
    size: u64,
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self {
            md5: md5::Md5::new(),
            sha1: sha1::Sha1::new(),
            sha256: sha2::Sha256::new(),
            sha512: sha2::Sha512::new(),
            size: 0,
        }
    }
}

impl MultiDigester {
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
        self.size += data.len() as u64;
    }

    pub fn finish(self) -> ContentDigests {
        ContentDigests {
            size: self.size,
            md5: hex::encode(self.md5.finalize()),
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
            sha512: hex::encode(self.sha512.finalize()),
        }
    }

    /// Digest a complete byte slice.
    pub fn digest(data: &[u8]) -> ContentDigests {
        let mut digester = Self::default();
        digester.update(data);
        digester.finish()
    }
}

/// An in-memory `Release` manifest.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReleaseFile {
    pub suite: String,
    pub codename: String,
    pub date: String,
    pub description: String,
    md5sum: BTreeMap<String, DigestEntry>,
    sha1: BTreeMap<String, DigestEntry>,
    sha256: BTreeMap<String, DigestEntry>,
    sha512: BTreeMap<String, DigestEntry>,
}

impl ReleaseFile {
    /// Construct an empty manifest for a distribution.
    pub fn new(distribution: &str) -> Self {
        Self {
            suite: distribution.to_string(),
            codename: distribution.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            ..Default::default()
        }
    }

    /// Parse the text content of an existing `Release` file.
    ///
    /// `Origin` and `Label` in the input are ignored: emitted manifests
    /// always carry this repository's identity. Unrecognized scalar
    /// fields are dropped.
    pub fn parse(text: &str) -> Self {
        let mut release = Self {
            description: DEFAULT_DESCRIPTION.to_string(),
            ..Default::default()
        };
        let mut section: Option<ChecksumType> = None;

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }

            if let Some(checksum) = Self::section_label(line) {
                section = Some(checksum);
                continue;
            }

            if line.starts_with(' ') {
                if let Some(checksum) = section {
                    release.parse_entry(checksum, line);
                }
                continue;
            }

            section = None;

            if let Some((name, value)) = line.split_once(": ") {
                match name {
                    "Suite" => release.suite = value.to_string(),
                    "Codename" => release.codename = value.to_string(),
                    "Date" => release.date = value.to_string(),
                    "Description" => release.description = value.to_string(),
                    _ => {}
                }
            }
        }

        release
    }

    fn section_label(line: &str) -> Option<ChecksumType> {
        ChecksumType::all()
            .into_iter()
            .find(|checksum| line == format!("{}:", checksum.field_name()))
    }

    fn parse_entry(&mut self, checksum: ChecksumType, line: &str) {
        let mut parts = line.split_whitespace();

        let (digest, size, path) = match (parts.next(), parts.next(), parts.next()) {
            (Some(digest), Some(size), Some(path)) => (digest, size, path),
            _ => {
                debug!("skipping malformed {} entry: {:?}", checksum.field_name(), line);
                return;
            }
        };

        self.entries_mut(checksum).insert(
            path.to_string(),
            DigestEntry {
                digest: digest.to_string(),
                size: size.parse().unwrap_or_default(),
            },
        );
    }

    /// Entries of one checksum section, keyed by path relative to the
    /// distribution root.
    pub fn entries(&self, checksum: ChecksumType) -> &BTreeMap<String, DigestEntry> {
        match checksum {
            ChecksumType::Md5 => &self.md5sum,
            ChecksumType::Sha1 => &self.sha1,
            ChecksumType::Sha256 => &self.sha256,
            ChecksumType::Sha512 => &self.sha512,
        }
    }

    fn entries_mut(&mut self, checksum: ChecksumType) -> &mut BTreeMap<String, DigestEntry> {
        match checksum {
            ChecksumType::Md5 => &mut self.md5sum,
            ChecksumType::Sha1 => &mut self.sha1,
            ChecksumType::Sha256 => &mut self.sha256,
            ChecksumType::Sha512 => &mut self.sha512,
        }
    }

    /// Record digests of an index file's content under all four
    /// checksum sections, replacing any prior entries for the path.
    pub fn add_artifact(&mut self, path: &str, data: &[u8]) {
        let digests = MultiDigester::digest(data);

        for (checksum, digest) in [
            (ChecksumType::Md5, &digests.md5),
            (ChecksumType::Sha1, &digests.sha1),
            (ChecksumType::Sha256, &digests.sha256),
            (ChecksumType::Sha512, &digests.sha512),
        ] {
            self.entries_mut(checksum).insert(
                path.to_string(),
                DigestEntry {
                    digest: digest.clone(),
                    size: digests.size,
                },
            );
        }
    }

    /// Stamp the manifest with the current time.
    pub fn refresh_date(&mut self) {
        self.date = Utc::now().format(DATE_FORMAT).to_string();
    }
}

impl fmt::Display for ReleaseFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Origin: {}", RELEASE_ORIGIN)?;
        writeln!(f, "Label: {}", RELEASE_LABEL)?;
        writeln!(f, "Suite: {}", self.suite)?;
        writeln!(f, "Codename: {}", self.codename)?;
        writeln!(f, "Date: {}", self.date)?;
        writeln!(f, "Description: {}", self.description)?;

        for checksum in ChecksumType::all() {
            writeln!(f, "{}:", checksum.field_name())?;
            for (path, entry) in self.entries(checksum) {
                writeln!(f, " {} {:>16} {}", entry.digest, entry.size, path)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn new_manifest_defaults() {
        let release = ReleaseFile::new("focal");
        assert_eq!(release.suite, "focal");
        assert_eq!(release.codename, "focal");
        assert_eq!(release.description, "APT package repository");
        assert!(release.entries(ChecksumType::Sha256).is_empty());
    }

    #[test]
    fn add_artifact_populates_all_sections() {
        let mut release = ReleaseFile::new("focal");
        release.add_artifact("main/binary-amd64/Packages", b"hello");

        for checksum in ChecksumType::all() {
            let entry = &release.entries(checksum)["main/binary-amd64/Packages"];
            assert_eq!(entry.size, 5);
        }

        assert_eq!(
            release.entries(ChecksumType::Md5)["main/binary-amd64/Packages"].digest,
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            release.entries(ChecksumType::Sha256)["main/binary-amd64/Packages"].digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn serialize_format() {
        let mut release = ReleaseFile::new("focal");
        release.date = "Mon, 01 Jan 2024 00:00:00 +0000".to_string();
        release.add_artifact("main/binary-amd64/Packages", b"hello");

        let text = release.to_string();
        assert!(text.starts_with("Origin: APT Repository\nLabel: apt-repository\n"));
        assert!(text.contains("Suite: focal\nCodename: focal\n"));
        // Size right-justified in a 16 character field, one leading space.
        assert!(text.contains(
            " 5d41402abc4b2a76b9719d911017c592                5 main/binary-amd64/Packages\n"
        ));
    }

    #[test]
    fn parse_round_trip() {
        let mut release = ReleaseFile::new("jammy");
        release.date = "Mon, 01 Jan 2024 00:00:00 +0000".to_string();
        release.add_artifact("main/binary-amd64/Packages", b"hello");
        release.add_artifact("main/binary-amd64/Packages.gz", b"world!");

        let text = release.to_string();
        let reparsed = ReleaseFile::parse(&text);

        assert_eq!(reparsed, release);
        assert_eq!(reparsed.to_string(), text);
    }

    #[test]
    fn parse_ignores_foreign_origin_and_label() {
        let release = ReleaseFile::parse(indoc! {"
            Origin: Somebody Else
            Label: not-ours
            Suite: focal
            Codename: focal
            Date: Mon, 01 Jan 2024 00:00:00 +0000
            Description: their repository
        "});

        assert_eq!(release.suite, "focal");
        assert_eq!(release.description, "their repository");
        assert!(release.to_string().starts_with("Origin: APT Repository\n"));
    }

    #[test]
    fn parse_tolerates_extra_entry_indentation() {
        let release = ReleaseFile::parse(indoc! {"
            Suite: focal
            MD5Sum:
              5d41402abc4b2a76b9719d911017c592                5 main/binary-amd64/Packages
        "});

        assert_eq!(
            release.entries(ChecksumType::Md5)["main/binary-amd64/Packages"].size,
            5
        );
    }

    #[test]
    fn refresh_date_format() {
        let mut release = ReleaseFile::new("focal");
        release.refresh_date();

        // "Mon, 01 Jan 2024 00:00:00 +0000" shape.
        assert_eq!(release.date.len(), 31);
        assert!(release.date.contains(", "));
        assert!(release.date.ends_with("+0000"));
    }
}
