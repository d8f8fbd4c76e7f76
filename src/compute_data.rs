//! Standard deviation between data sets.

use crate::error::{Error, Result};
use crate::models::{self, DayVector, Format, Table, TableLoader};
use glob::{Pattern, glob};
use ndarray::{Axis, stack};
use std::{
    io,
    path::{Path, PathBuf},
};

/// Anything able to produce all inflammation tables of one analysis run.
pub trait DataSource {
    fn load_inflammation_data(&self) -> Result<Vec<Table>>;
}

/// Data source backed by the `inflammation*.<ext>` files of a directory.
///
/// The loader decides the extension and how each file is parsed; use
/// [`FileDataSource::csv`] or [`FileDataSource::json`] for the real formats.
pub struct FileDataSource<L = Format> {
    data_dir: PathBuf,
    loader: L,
}

impl FileDataSource<Format> {
    pub fn csv<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir, Format::Csv)
    }

    pub fn json<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir, Format::Json)
    }

    /// Build the data source serving the directory and format of `file`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedFormat`] if the extension of `file` is
    /// neither `.csv` nor `.json`.
    pub fn for_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let format = Format::from_path(file)?;
        let data_dir = match file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        Ok(Self::new(data_dir, format))
    }
}

impl<L: TableLoader> FileDataSource<L> {
    pub fn new<P: AsRef<Path>>(data_dir: P, loader: L) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            loader,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn format(&self) -> Format {
        self.loader.format()
    }

    /// Matching files, sorted by name.
    pub fn data_file_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = Pattern::escape(&self.data_dir.to_string_lossy());
        let pattern = Path::new(&dir).join(format!("inflammation*.{}", self.format().ext()));

        let mut paths = glob(&pattern.to_string_lossy())?
            .map(|entry| {
                entry.map_err(|err| {
                    let path = err.path().to_path_buf();
                    Error::Io {
                        path,
                        source: io::Error::from(err),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;
        paths.retain(|path| path.is_file());
        paths.sort();

        Ok(paths)
    }
}

impl<L: TableLoader> DataSource for FileDataSource<L> {
    fn load_inflammation_data(&self) -> Result<Vec<Table>> {
        let paths = self.data_file_paths()?;
        if paths.is_empty() {
            return Err(Error::NoDataFound {
                dir: self.data_dir.clone(),
                ext: self.format().ext(),
            });
        }
        log::info!("found {} data files in {:?}", paths.len(), self.data_dir);

        paths.iter().map(|path| self.loader.load(path)).collect()
    }
}

/// Standard deviation, across data sets, of each data set's daily mean.
///
/// # Errors
/// Returns [`Error::Shape`] if the data sets do not all cover the same number
/// of days, and [`Error::Empty`] if there are no data sets or one of them has
/// no subjects.
pub fn compute_standard_deviation_by_day(data: &[Table]) -> Result<DayVector> {
    let means_by_day = data
        .iter()
        .map(|table| models::daily_mean(table.view()))
        .collect::<Result<Vec<_>>>()?;
    if means_by_day.is_empty() {
        return Err(Error::Empty);
    }

    let views: Vec<_> = means_by_day.iter().map(|means| means.view()).collect();
    let means_by_day_matrix = stack(Axis(0), &views).map_err(|_| {
        let n_days: Vec<_> = means_by_day.iter().map(|means| means.len()).collect();
        Error::Shape(format!(
            "data sets must cover the same number of days, but cover {n_days:?}"
        ))
    })?;

    models::daily_std(means_by_day_matrix.view())
}

/// Load every table of `data_source` and compute the daily standard
/// deviation of their means.
pub fn analyse_data<S: DataSource + ?Sized>(data_source: &S) -> Result<DayVector> {
    let data = data_source.load_inflammation_data()?;
    compute_standard_deviation_by_day(&data)
}
