// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apt_repository::{
        error::RepoError,
        publisher::{self, PackageInput, PublishRequest, Publisher},
        signing::SigningKey,
        store::{new_object_store, StoreBackend, StoreConfig},
    },
    clap::{Arg, ArgMatches, Command},
    std::path::PathBuf,
    thiserror::Error,
};

const ABOUT: &str = "\
Publish .deb packages to an APT repository in object storage.

The repository lives entirely in a bucket of a remote object store
(AWS S3 or an S3 compatible service such as Aliyun OSS). Publishing
uploads the package files, merges their metadata into the per
architecture `Packages` indices, regenerates the `Release` manifest of
each touched distribution and signs it with the provided PGP key.

`--deb-paths` and `--architectures` are comma separated lists of the
same length with positional correspondence: the Nth package publishes
under the Nth architecture.

Every option can also be supplied through an `INPUT_*` environment
variable, which is how CI pipelines typically invoke this tool.

The target distribution may be a single Ubuntu release name, or `all`
to publish the packages to every supported release at once under
component `stable`.
";

#[derive(Debug, Error)]
pub enum PublishCliError {
    #[error("argument parsing error: {0:?}")]
    Clap(#[from] clap::Error),

    #[error("{0}")]
    Repo(#[from] RepoError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("signing key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PublishCliError>;

pub async fn run_cli() -> Result<()> {
    let app = Command::new("apt-publish")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Publish .deb packages to an APT repository in object storage")
        .long_about(ABOUT)
        .arg(
            Arg::new("distribution")
                .long("distribution")
                .env("INPUT_UBUNTU-DISTRO")
                .takes_value(true)
                .required(true)
                .help("Target Ubuntu distribution, or `all`"),
        )
        .arg(
            Arg::new("deb-paths")
                .long("deb-paths")
                .env("INPUT_DEB-PATHS")
                .takes_value(true)
                .required(true)
                .help("Comma separated list of .deb files to publish"),
        )
        .arg(
            Arg::new("architectures")
                .long("architectures")
                .env("INPUT_ARCHITECTURES")
                .takes_value(true)
                .required(true)
                .help("Comma separated architectures, one per package (e.g. amd64,arm64)"),
        )
        .arg(
            Arg::new("storage-provider")
                .long("storage-provider")
                .env("INPUT_STORAGE-PROVIDER")
                .takes_value(true)
                .default_value("s3")
                .help("Storage backend: s3, aws, oss or aliyun"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .env("INPUT_ENDPOINT")
                .takes_value(true)
                .required(true)
                .help("Object store endpoint URL"),
        )
        .arg(
            Arg::new("region")
                .long("region")
                .env("INPUT_REGION")
                .takes_value(true)
                .required(true)
                .help("Object store region name"),
        )
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .env("INPUT_BUCKET")
                .takes_value(true)
                .required(true)
                .help("Bucket holding the repository"),
        )
        .arg(
            Arg::new("access-key-id")
                .long("access-key-id")
                .env("INPUT_ACCESS-KEY-ID")
                .takes_value(true)
                .required(true)
                .help("Object store access key id"),
        )
        .arg(
            Arg::new("access-key-secret")
                .long("access-key-secret")
                .env("INPUT_ACCESS-KEY-SECRET")
                .takes_value(true)
                .required(true)
                .help("Object store secret access key"),
        )
        .arg(
            Arg::new("key-prefix")
                .long("key-prefix")
                .env("INPUT_KEY-PREFIX")
                .takes_value(true)
                .help("Optional key prefix anchoring the repository in the bucket"),
        )
        .arg(
            Arg::new("gpg-private-key")
                .long("gpg-private-key")
                .env("INPUT_GPG-PRIVATE-KEY")
                .takes_value(true)
                .required(true)
                .help("Base64 encoded ASCII armored PGP secret key"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .env("INPUT_DRY-RUN")
                .takes_value(false)
                .help("Compute everything but skip all store writes"),
        );

    let matches = app.get_matches();

    command_publish(&matches).await
}

/// Required string argument. clap enforces presence; this converts and
/// rejects blank values coming from empty environment variables.
fn required_arg(args: &ArgMatches, name: &str) -> Result<String> {
    let value = args
        .value_of(name)
        .ok_or_else(|| PublishCliError::Config(format!("missing required argument: {}", name)))?;

    if value.trim().is_empty() {
        return Err(PublishCliError::Config(format!(
            "argument {} must not be empty",
            name
        )));
    }

    Ok(value.trim().to_string())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Pair package paths with their architectures, validating both lists.
fn parse_packages(deb_paths: &str, architectures: &str) -> Result<Vec<PackageInput>> {
    let paths = split_list(deb_paths);
    let architectures = split_list(architectures);

    if paths.is_empty() {
        return Err(PublishCliError::Config(
            "no package files specified".to_string(),
        ));
    }

    if paths.len() != architectures.len() {
        return Err(PublishCliError::Config(format!(
            "deb-paths has {} entries but architectures has {}",
            paths.len(),
            architectures.len()
        )));
    }

    paths
        .into_iter()
        .zip(architectures)
        .map(|(path, architecture)| {
            let deb_path = PathBuf::from(path);

            if !deb_path.is_file() {
                return Err(PublishCliError::Config(format!(
                    "package file does not exist: {}",
                    deb_path.display()
                )));
            }

            Ok(PackageInput {
                deb_path,
                architecture,
            })
        })
        .collect()
}

async fn command_publish(args: &ArgMatches) -> Result<()> {
    let distribution = required_arg(args, "distribution")?;
    if !publisher::is_valid_distribution(&distribution) {
        return Err(PublishCliError::Config(format!(
            "unknown distribution name: {}",
            distribution
        )));
    }

    let packages = parse_packages(
        &required_arg(args, "deb-paths")?,
        &required_arg(args, "architectures")?,
    )?;

    let backend: StoreBackend = required_arg(args, "storage-provider")?.parse()?;

    let store = new_object_store(&StoreConfig {
        backend,
        endpoint: required_arg(args, "endpoint")?,
        region: required_arg(args, "region")?,
        bucket: required_arg(args, "bucket")?,
        access_key_id: required_arg(args, "access-key-id")?,
        secret_access_key: required_arg(args, "access-key-secret")?,
        key_prefix: args.value_of("key-prefix").map(|x| x.to_string()),
    })?;

    let armored_key = base64::decode(required_arg(args, "gpg-private-key")?)?;
    let signing_key = SigningKey::from_armored(&armored_key)?;

    let mut publisher = Publisher::new(store, signing_key);
    publisher.set_dry_run(args.is_present("dry-run"));

    let request = PublishRequest {
        distribution,
        packages,
    };

    publisher.publish(&request).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn touch(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn parse_packages_pairs_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(&dir, "a.deb");
        let b = touch(&dir, "b.deb");

        let value = format!("{} , {},", a.display(), b.display());
        let packages = parse_packages(&value, "amd64, arm64").unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].deb_path, a);
        assert_eq!(packages[0].architecture, "amd64");
        assert_eq!(packages[1].deb_path, b);
        assert_eq!(packages[1].architecture, "arm64");
    }

    #[test]
    fn parse_packages_rejects_empty() {
        assert!(matches!(
            parse_packages(" , ", "amd64").unwrap_err(),
            PublishCliError::Config(_)
        ));
    }

    #[test]
    fn parse_packages_rejects_length_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(&dir, "a.deb");
        let b = touch(&dir, "b.deb");

        let value = format!("{},{}", a.display(), b.display());
        assert!(matches!(
            parse_packages(&value, "amd64").unwrap_err(),
            PublishCliError::Config(_)
        ));
    }

    #[test]
    fn parse_packages_rejects_missing_file() {
        assert!(matches!(
            parse_packages("/no/such/file.deb", "amd64").unwrap_err(),
            PublishCliError::Config(_)
        ));
    }
}
