// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading `.deb` package files.

A `.deb` is a Unix ar archive containing a `debian-binary` version
member, a `control.tar.*` member holding package metadata and a
`data.tar.*` member holding the installed files. Only the control
member matters here: [read_package_record] walks the ar archive, finds
`control.tar.gz`, `control.tar.xz` or `control.tar.zst`, decompresses
it and parses the `control` file inside into a [PackageRecord].
*/

use {
    crate::{
        control::PackageRecord,
        error::{RepoError, Result},
    },
    std::io::{Cursor, Read},
};

/// Obtain a decompressing reader for a `control.tar` member extension.
fn control_reader(extension: &str, data: Cursor<Vec<u8>>) -> Result<Box<dyn Read>> {
    match extension {
        ".gz" => Ok(Box::new(
            libflate::gzip::Decoder::new(data)
                .map_err(|e| RepoError::DebDecode(format!("gzip: {}", e)))?,
        )),
        ".xz" => Ok(Box::new(xz2::read::XzDecoder::new(data))),
        ".zst" => Ok(Box::new(
            zstd::stream::Decoder::new(data)
                .map_err(|e| RepoError::DebDecode(format!("zstd: {}", e)))?,
        )),
        _ => Err(RepoError::DebFormat(format!(
            "unhandled control member compression: {}",
            extension
        ))),
    }
}

/// Extract the control file of a tar archive and parse it.
fn record_from_control_tar(reader: impl Read) -> Result<PackageRecord> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive
        .entries()
        .map_err(|e| RepoError::DebDecode(format!("tar: {}", e)))?
    {
        let mut entry = entry.map_err(|e| RepoError::DebDecode(format!("tar: {}", e)))?;

        let path = entry
            .path()
            .map_err(|e| RepoError::DebDecode(format!("tar: {}", e)))?
            .to_string_lossy()
            .to_string();

        // Archives name the member either `control` or `./control`.
        if path == "control" || path == "./control" {
            let mut text = String::new();
            entry
                .read_to_string(&mut text)
                .map_err(|e| RepoError::DebDecode(format!("tar: {}", e)))?;

            return Ok(PackageRecord::parse(&text));
        }
    }

    Err(RepoError::DebFormat(
        "control file not found in control archive".to_string(),
    ))
}

/// Read the package metadata record of a `.deb` file.
pub fn read_package_record(reader: impl Read) -> Result<PackageRecord> {
    let mut archive = ar::Archive::new(reader);

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(|e| RepoError::DebFormat(e.to_string()))?;

        let member = String::from_utf8_lossy(entry.header().identifier()).to_string();

        if let Some(extension) = member.strip_prefix("control.tar") {
            if matches!(extension, ".gz" | ".xz" | ".zst") {
                let mut data = Vec::new();
                entry
                    .read_to_end(&mut data)
                    .map_err(|e| RepoError::DebFormat(e.to_string()))?;

                let reader = control_reader(extension, Cursor::new(data))?;

                return record_from_control_tar(reader);
            }
        }
    }

    Err(RepoError::DebFormat(
        "control.tar member not found".to_string(),
    ))
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::io::Write;

    pub(crate) enum ControlCompression {
        Gzip,
        Xz,
        Zstd,
    }

    /// Assemble a minimal `.deb` with the given control file content.
    pub(crate) fn build_deb(control: &str, compression: ControlCompression) -> Vec<u8> {
        let mut control_tar = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_gnu();
        header.set_size(control.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        control_tar
            .append_data(&mut header, "./control", control.as_bytes())
            .unwrap();

        let control_tar = control_tar.into_inner().unwrap();

        let (member_name, compressed) = match compression {
            ControlCompression::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(Vec::new()).unwrap();
                encoder.write_all(&control_tar).unwrap();
                (
                    "control.tar.gz",
                    encoder.finish().into_result().unwrap(),
                )
            }
            ControlCompression::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
                encoder.write_all(&control_tar).unwrap();
                ("control.tar.xz", encoder.finish().unwrap())
            }
            ControlCompression::Zstd => (
                "control.tar.zst",
                zstd::stream::encode_all(control_tar.as_slice(), 0).unwrap(),
            ),
        };

        let mut deb = ar::Builder::new(Vec::new());

        let version = b"2.0\n";
        deb.append(
            &ar::Header::new(b"debian-binary".to_vec(), version.len() as u64),
            version.as_slice(),
        )
        .unwrap();
        deb.append(
            &ar::Header::new(member_name.as_bytes().to_vec(), compressed.len() as u64),
            compressed.as_slice(),
        )
        .unwrap();

        deb.into_inner().unwrap()
    }
}

#[cfg(test)]
mod test {
    use {
        super::{
            testutil::{build_deb, ControlCompression},
            *,
        },
        indoc::indoc,
    };

    const CONTROL: &str = indoc! {"
        Package: foo
        Version: 1.2.3
        Architecture: amd64
        Maintainer: Foo Maintainers <foo@example.com>
        Description: a tool that does foo
         with a second line
    "};

    #[test]
    fn reads_gzip_control() {
        let deb = build_deb(CONTROL, ControlCompression::Gzip);
        let record = read_package_record(Cursor::new(deb)).unwrap();

        assert_eq!(record.name, "foo");
        assert_eq!(record.version, "1.2.3");
        assert_eq!(record.architecture, "amd64");
        assert_eq!(record.description, "a tool that does foo\nwith a second line");
    }

    #[test]
    fn reads_xz_control() {
        let deb = build_deb(CONTROL, ControlCompression::Xz);
        let record = read_package_record(Cursor::new(deb)).unwrap();
        assert_eq!(record.name, "foo");
    }

    #[test]
    fn reads_zstd_control() {
        let deb = build_deb(CONTROL, ControlCompression::Zstd);
        let record = read_package_record(Cursor::new(deb)).unwrap();
        assert_eq!(record.name, "foo");
    }

    #[test]
    fn rejects_bad_magic() {
        let err = read_package_record(Cursor::new(b"not an archive at all".to_vec()))
            .unwrap_err();
        assert!(matches!(err, RepoError::DebFormat(_)));
    }

    #[test]
    fn rejects_missing_control_member() {
        let mut archive = ar::Builder::new(Vec::new());
        let version = b"2.0\n";
        archive
            .append(
                &ar::Header::new(b"debian-binary".to_vec(), version.len() as u64),
                version.as_slice(),
            )
            .unwrap();
        let deb = archive.into_inner().unwrap();

        let err = read_package_record(Cursor::new(deb)).unwrap_err();
        assert!(matches!(err, RepoError::DebFormat(_)));
    }

    #[test]
    fn rejects_control_archive_without_control_file() {
        let mut control_tar = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        control_tar
            .append_data(&mut header, "./other", "hi".as_bytes())
            .unwrap();
        let control_tar = control_tar.into_inner().unwrap();

        let mut encoder = libflate::gzip::Encoder::new(Vec::new()).unwrap();
        std::io::Write::write_all(&mut encoder, &control_tar).unwrap();
        let compressed = encoder.finish().into_result().unwrap();

        let mut deb = ar::Builder::new(Vec::new());
        deb.append(
            &ar::Header::new(b"control.tar.gz".to_vec(), compressed.len() as u64),
            compressed.as_slice(),
        )
        .unwrap();
        let deb = deb.into_inner().unwrap();

        let err = read_package_record(Cursor::new(deb)).unwrap_err();
        assert!(matches!(err, RepoError::DebFormat(_)));
    }
}
