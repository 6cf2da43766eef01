//! chartgate Core - chart model and packaging
//!
//! This crate provides the chart-side building blocks used by the push command:
//! - `ChartMetadata`: the `Chart.yaml` model, with unknown fields preserved
//! - `LoadedChart`: a chart read from a directory or an existing `.tgz`
//! - `HelmIgnore`: `.helmignore` rules applied while packaging
//! - `create_chart_package`: writes `<name>-<version>.tgz` archives

pub mod archive;
pub mod chart;
pub mod error;
pub mod ignore;

pub use archive::{create_chart_package, package_file_name, read_metadata_from_archive};
pub use chart::{
    CHART_FILE, ChartDependency, ChartMetadata, ChartSource, LoadedChart, REQUIREMENTS_FILE,
    is_chart_dir, load_requirements,
};
pub use error::{CoreError, Result};
pub use ignore::{HELMIGNORE_FILE, HelmIgnore};
