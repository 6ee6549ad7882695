//! `package-info.json`, the self-description written into every package root.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::build::SettingsAxis;
use crate::error::{Error, Result};
use crate::lifecycle::PackageInfo;
use crate::pipeline::package::PackagedArtifact;

pub const MANIFEST_FILENAME: &str = "package-info.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(flatten)]
    pub info: PackageInfo,
    /// Values of the axes the recipe declares, keyed by axis name.
    pub settings: BTreeMap<String, String>,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Path relative to the package root, `/`-separated.
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
}

impl PackageManifest {
    /// Describe the files `artifacts` placed under `package_root`.
    ///
    /// A file produced by more than one rule is listed once.
    pub fn collect(
        info: PackageInfo,
        settings: BTreeMap<SettingsAxis, String>,
        package_root: &Path,
        artifacts: &[PackagedArtifact],
    ) -> Result<Self> {
        let paths: BTreeSet<&PathBuf> = artifacts.iter().flat_map(|a| a.files.iter()).collect();

        let mut files = Vec::with_capacity(paths.len());
        for relative in paths {
            let (sha256, size_bytes) = sha256_file(&package_root.join(relative))?;
            files.push(ManifestFile {
                path: relative.to_string_lossy().replace('\\', "/"),
                size_bytes,
                sha256,
            });
        }

        Ok(Self {
            info,
            settings: settings
                .into_iter()
                .map(|(axis, value)| (axis.to_string(), value))
                .collect(),
            files,
        })
    }
}

pub fn manifest_path(package_root: &Path) -> PathBuf {
    package_root.join(MANIFEST_FILENAME)
}

/// Write the manifest next to the packaged files, replacing any previous one.
pub fn write_manifest(package_root: &Path, manifest: &PackageManifest) -> Result<PathBuf> {
    let path = manifest_path(package_root);
    let tmp = package_root.join(format!(".{}.tmp", MANIFEST_FILENAME));
    let bytes = serde_json::to_vec_pretty(manifest)?;

    fs::write(&tmp, bytes)
        .map_err(|err| Error::io(format!("writing package manifest '{}'", tmp.display()), err))?;
    fs::rename(&tmp, &path).map_err(|err| {
        Error::io(
            format!("moving package manifest into place '{}'", path.display()),
            err,
        )
    })?;
    Ok(path)
}

pub fn read_manifest(package_root: &Path) -> Result<PackageManifest> {
    let path = manifest_path(package_root);
    let bytes = fs::read(&path)
        .map_err(|err| Error::io(format!("reading package manifest '{}'", path.display()), err))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let context = || format!("hashing packaged file '{}'", path.display());
    let file = File::open(path).map_err(|err| Error::io(context(), err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf).map_err(|err| Error::io(context(), err))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
