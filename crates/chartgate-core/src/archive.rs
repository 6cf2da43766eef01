//! Chart package creation and inspection
//!
//! Packages follow the Helm layout: a gzipped tarball named
//! `<name>-<version>.tgz` whose entries all live under `<name>/`.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

use crate::chart::{CHART_FILE, ChartMetadata, ChartSource, LoadedChart};
use crate::error::{CoreError, Result};
use crate::ignore::HelmIgnore;

/// Package a loaded chart into `dest_dir`
///
/// The archive's `Chart.yaml` is regenerated from `chart.metadata`, so any
/// version or appVersion override applied to the chart ends up in the package.
/// Returns the path of the created archive.
pub fn create_chart_package(chart: &LoadedChart, dest_dir: &Path) -> Result<PathBuf> {
    let output = dest_dir.join(package_file_name(&chart.metadata));
    let chart_yaml = chart.metadata.to_yaml()?;

    let file = File::create(&output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let prefix = chart.metadata.name.as_str();
    add_bytes_to_archive(
        &mut builder,
        &format!("{}/{}", prefix, CHART_FILE),
        chart_yaml.as_bytes(),
    )?;

    match &chart.source {
        ChartSource::Directory(root) => add_chart_dir(&mut builder, root, prefix)?,
        ChartSource::Archive(path) => copy_chart_archive(&mut builder, path, prefix)?,
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;

    tracing::debug!(archive = %output.display(), "created chart package");
    Ok(output)
}

/// Standard package file name for a chart
#[must_use]
pub fn package_file_name(metadata: &ChartMetadata) -> String {
    format!("{}-{}.tgz", metadata.name, metadata.version)
}

/// Read `Chart.yaml` from a chart archive
///
/// The metadata file is expected one level deep (`<dir>/Chart.yaml`);
/// nested subchart metadata is ignored.
pub fn read_metadata_from_archive(archive_path: &Path) -> Result<ChartMetadata> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();

        if split_top_dir(&path).map(|(_, rest)| rest) == Some(CHART_FILE) {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return ChartMetadata::from_bytes(&content);
        }
    }

    Err(CoreError::Archive {
        message: format!(
            "{} not found in archive {}",
            CHART_FILE,
            archive_path.display()
        ),
    })
}

fn add_chart_dir<W: Write>(builder: &mut Builder<W>, root: &Path, prefix: &str) -> Result<()> {
    let ignore = HelmIgnore::for_chart_dir(root)?;

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let rel = relative_path(root, entry.path());
            !ignore.is_ignored(&rel, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Archive {
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_path(root, entry.path());
        if rel == CHART_FILE {
            continue;
        }
        add_file_to_archive(builder, entry.path(), &format!("{}/{}", prefix, rel))?;
    }

    Ok(())
}

/// Copy every file of an existing package except its `Chart.yaml`,
/// re-rooting entries under `prefix`
fn copy_chart_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &Path,
    prefix: &str,
) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.to_string_lossy().to_string();
        let Some((_, rest)) = split_top_dir(&path) else {
            continue;
        };
        if rest == CHART_FILE {
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        add_bytes_to_archive(builder, &format!("{}/{}", prefix, rest), &content)?;
    }

    Ok(())
}

fn split_top_dir(path: &str) -> Option<(&str, &str)> {
    let path = path.trim_start_matches("./");
    path.split_once('/').filter(|(_, rest)| !rest.is_empty())
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Add a file to a tar archive
fn add_file_to_archive<W: Write>(
    builder: &mut Builder<W>,
    file_path: &Path,
    archive_path: &str,
) -> Result<()> {
    let content = std::fs::read(file_path)?;
    add_bytes_to_archive(builder, archive_path, &content)
}

/// Add bytes to a tar archive with a given path
fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible builds: use epoch time
    header.set_cksum();

    builder.append_data(&mut header, archive_path, content)?;

    Ok(())
}
