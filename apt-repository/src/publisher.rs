// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository publishing.

[Publisher] drives a complete publish: it takes the repository lock,
uploads each `.deb`, folds its metadata into the affected `Packages`
indices, regenerates the per distribution `Release` manifest and signs
it, then releases the lock.

The distribution name `all` is a sentinel that fans the publish out to
every supported Ubuntu release under component `stable`; the package
bytes are uploaded once and replicated with server side copies. A
concrete distribution name publishes to it alone under component
`main`.
*/

use {
    crate::{
        control::PackageRecord,
        deb,
        error::{RepoError, Result},
        lock::RepoLock,
        packages_index::PackagesIndex,
        release::{ContentDigests, MultiDigester, ReleaseFile},
        signing::SigningKey,
        store::ObjectStore,
    },
    log::{info, warn},
    std::{
        collections::{BTreeMap, BTreeSet},
        io::{Cursor, Write},
        path::PathBuf,
        sync::Arc,
    },
};

/// Distributions the `all` sentinel expands to.
pub const SUPPORTED_DISTRIBUTIONS: &[&str] = &["bionic", "focal", "jammy", "noble"];

/// Distribution names accepted for publishing.
pub const VALID_DISTRIBUTIONS: &[&str] = &["bionic", "focal", "jammy", "noble", "trusty"];

/// Sentinel distribution name expanding to [SUPPORTED_DISTRIBUTIONS].
pub const ALL_DISTRIBUTIONS: &str = "all";

const COMPONENT_STABLE: &str = "stable";
const COMPONENT_MAIN: &str = "main";

/// Whether a distribution name is accepted for publishing.
pub fn is_valid_distribution(name: &str) -> bool {
    name == ALL_DISTRIBUTIONS || VALID_DISTRIBUTIONS.contains(&name)
}

/// One `.deb` file to publish.
#[derive(Clone, Debug)]
pub struct PackageInput {
    /// Local filesystem path of the package file.
    pub deb_path: PathBuf,
    /// Architecture directory the package publishes under.
    pub architecture: String,
}

/// A publish operation: one or more packages into one distribution.
#[derive(Clone, Debug)]
pub struct PublishRequest {
    /// Target distribution, or [ALL_DISTRIBUTIONS].
    pub distribution: String,
    pub packages: Vec<PackageInput>,
}

/// A package loaded and digested, ready for upload.
struct PackagePlan {
    record: PackageRecord,
    data: Vec<u8>,
    digests: ContentDigests,
    basename: String,
    architecture: String,
}

/// Publishes packages to an APT repository in an [ObjectStore].
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    signing_key: SigningKey,
    dry_run: bool,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, signing_key: SigningKey) -> Self {
        Self {
            store,
            signing_key,
            dry_run: false,
        }
    }

    /// When set, all store writes (including the lock) are logged and
    /// skipped. Reads still occur, so the full publish computation
    /// runs.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Run a complete publish under the repository lock.
    ///
    /// The lock is released on both success and failure. A publish
    /// error takes precedence over a release error.
    pub async fn publish(&self, request: &PublishRequest) -> Result<()> {
        if self.dry_run {
            info!("dry run: repository lock not taken");
            return self.publish_locked(request).await;
        }

        let lock = RepoLock::new(self.store.clone());
        lock.acquire().await?;

        let result = self.publish_locked(request).await;

        match lock.release().await {
            Ok(()) => result,
            Err(e) if result.is_ok() => Err(e),
            Err(e) => {
                warn!("failed to release repository lock: {}", e);
                result
            }
        }
    }

    async fn publish_locked(&self, request: &PublishRequest) -> Result<()> {
        let (distributions, component) = if request.distribution == ALL_DISTRIBUTIONS {
            (SUPPORTED_DISTRIBUTIONS.to_vec(), COMPONENT_STABLE)
        } else {
            (vec![request.distribution.as_str()], COMPONENT_MAIN)
        };

        let mut plans = Vec::with_capacity(request.packages.len());
        for input in &request.packages {
            plans.push(self.load_package(input)?);
        }

        for (distro_index, distro) in distributions.iter().enumerate() {
            info!(
                "publishing {} package(s) to {}/{}",
                plans.len(),
                distro,
                component
            );

            let mut stage = BTreeMap::new();
            let mut staged_paths = BTreeSet::new();

            for plan in &plans {
                let arch_dir = format!("dists/{}/{}/binary-{}", distro, component, plan.architecture);
                let deb_key = format!("{}/{}", arch_dir, plan.basename);

                if distro_index == 0 {
                    self.put(&deb_key, plan.data.clone()).await?;
                } else {
                    // Replicate the upload made to the first target.
                    let source = format!(
                        "dists/{}/{}/binary-{}/{}",
                        distributions[0], component, plan.architecture, plan.basename
                    );
                    self.copy(&source, &deb_key).await?;
                }

                let mut record = plan.record.clone();
                record.filename = deb_key;
                record.size = plan.digests.size;
                record.md5sum = plan.digests.md5.clone();
                record.sha1 = plan.digests.sha1.clone();
                record.sha256 = plan.digests.sha256.clone();

                let packages_key = format!("{}/Packages", arch_dir);
                let mut index = match self.store.get(&packages_key).await? {
                    Some(existing) => PackagesIndex::parse(&String::from_utf8_lossy(&existing)),
                    None => PackagesIndex::default(),
                };

                index.merge(record);

                let content = index.to_string();
                let compressed = gzip_bytes(content.as_bytes())?;

                self.put(&packages_key, content.clone().into_bytes()).await?;
                self.put(&format!("{}/Packages.gz", arch_dir), compressed.clone())
                    .await?;

                // Release entries are relative to the distribution root.
                let relative = format!("{}/binary-{}/Packages", component, plan.architecture);
                stage.insert(relative.clone(), content.into_bytes());
                staged_paths.insert(relative.clone());
                stage.insert(format!("{}.gz", relative), compressed);
                staged_paths.insert(format!("{}.gz", relative));
            }

            self.publish_release(distro, &staged_paths, &stage).await?;
        }

        Ok(())
    }

    fn load_package(&self, input: &PackageInput) -> Result<PackagePlan> {
        let data = std::fs::read(&input.deb_path)?;

        let mut digester = MultiDigester::default();
        digester.update(&data);
        let digests = digester.finish();

        let record = deb::read_package_record(Cursor::new(&data))?;

        let basename = input
            .deb_path
            .file_name()
            .ok_or_else(|| {
                RepoError::DebFormat(format!(
                    "package path has no file name: {}",
                    input.deb_path.display()
                ))
            })?
            .to_string_lossy()
            .to_string();

        info!(
            "loaded {} {} ({}, {} bytes)",
            record.name, record.version, input.architecture, digests.size
        );

        Ok(PackagePlan {
            record,
            data,
            digests,
            basename,
            architecture: input.architecture.clone(),
        })
    }

    async fn publish_release(
        &self,
        distro: &str,
        staged_paths: &BTreeSet<String>,
        stage: &BTreeMap<String, Vec<u8>>,
    ) -> Result<()> {
        let release_key = format!("dists/{}/Release", distro);

        let mut release = match self.store.get(&release_key).await? {
            Some(existing) => ReleaseFile::parse(&String::from_utf8_lossy(&existing)),
            None => ReleaseFile::new(distro),
        };

        if release.suite.is_empty() {
            release.suite = distro.to_string();
        }
        if release.codename.is_empty() {
            release.codename = distro.to_string();
        }

        update_release_entries(&mut release, staged_paths, stage);
        release.refresh_date();

        let text = release.to_string();
        self.put(&release_key, text.clone().into_bytes()).await?;

        let detached = self.signing_key.detached_signature(text.as_bytes())?;
        self.put(&format!("dists/{}/Release.gpg", distro), detached.into_bytes())
            .await?;

        let inline = self.signing_key.inline_signature(&text)?;
        self.put(&format!("dists/{}/InRelease", distro), inline.into_bytes())
            .await?;

        Ok(())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        if self.dry_run {
            info!("dry run: skipping write of {} ({} bytes)", key, data.len());
            return Ok(());
        }

        self.store.put(key, data).await
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> Result<()> {
        if self.dry_run {
            info!("dry run: skipping copy {} -> {}", source_key, dest_key);
            return Ok(());
        }

        self.store.copy(source_key, dest_key).await
    }
}

/// Fold freshly staged index files into a manifest.
///
/// Paths with no staged copy keep whatever entries a prior publish
/// recorded; losing one index must not invalidate the others.
fn update_release_entries(
    release: &mut ReleaseFile,
    paths: &BTreeSet<String>,
    stage: &BTreeMap<String, Vec<u8>>,
) {
    for path in paths {
        match stage.get(path) {
            Some(data) => release.add_artifact(path, data),
            None => warn!(
                "no staged copy of {}; keeping previous manifest entries",
                path
            ),
        }
    }
}

fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = libflate::gzip::Encoder::new(Vec::new())?;
    encoder.write_all(data)?;

    Ok(encoder.finish().into_result()?)
}
