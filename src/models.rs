//! Inflammation tables and the statistics computed over them.
//!
//! Patients' data is held in an inflammation table (2D array) where each row
//! contains the observations for a single patient over a number of days and
//! each column represents a single day across all patients.

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2, IxDyn};
use polars::prelude::{LazyCsvReader, LazyFileListReader};
use serde::Deserialize;
use serde_json::Value;
use std::{
    ffi::OsStr,
    fs::{self, File},
    io::BufReader,
    path::Path,
};

/// Inflammation table: rows are subjects, columns are days.
pub type Table = Array2<f64>;

/// One value per day.
pub type DayVector = Array1<f64>;

/// Supported input file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
}

impl Format {
    pub fn ext(self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Json => "json",
        }
    }

    /// Pick the format matching the extension of `path`.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedFormat`] naming the extension (with its
    /// leading dot, empty if the path has none) for anything other than
    /// `.csv` or `.json`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        match path.as_ref().extension().and_then(OsStr::to_str) {
            Some("csv") => Ok(Format::Csv),
            Some("json") => Ok(Format::Json),
            Some(ext) => Err(Error::UnsupportedFormat(format!(".{ext}"))),
            None => Err(Error::UnsupportedFormat(String::new())),
        }
    }
}

/// Loads one file into one [`Table`].
pub trait TableLoader {
    fn format(&self) -> Format;
    fn load(&self, path: &Path) -> Result<Table>;
}

impl TableLoader for Format {
    fn format(&self) -> Format {
        *self
    }

    fn load(&self, path: &Path) -> Result<Table> {
        match self {
            Format::Csv => load_csv(path),
            Format::Json => load_json(path),
        }
    }
}

/// Load a table from a file of the given format.
pub fn load_table<P: AsRef<Path>>(path: P, format: Format) -> Result<Table> {
    format.load(path.as_ref())
}

/// Load a table from a header-less, comma-delimited numeric grid.
///
/// Cells are read as text and parsed as `f64` after trimming surrounding
/// whitespace, so anything [`str::parse`] accepts is a valid cell (`nan`,
/// exponents, integers wider than 64 bits). Blank lines are skipped.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    fs::metadata(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let frame = LazyCsvReader::new(path)
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .finish()
        .and_then(|lazy| lazy.collect())
        .map_err(|err| Error::parse(path, err))?;

    let columns = frame
        .get_columns()
        .iter()
        .map(|column| column.as_materialized_series().str().cloned())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| Error::parse(path, err))?;

    let mut rows = Vec::with_capacity(frame.height());
    for i_row in 0..frame.height() {
        let cells: Vec<_> = columns
            .iter()
            .map(|column| column.get(i_row).map(str::trim).filter(|cell| !cell.is_empty()))
            .collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }

        let row = cells
            .into_iter()
            .enumerate()
            .map(|(i_col, cell)| parse_cell(cell, rows.len(), i_col))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|reason| Error::parse(path, reason))?;
        rows.push(row);
    }
    let table = stack_rows(rows).map_err(|reason| Error::parse(path, reason))?;

    log::debug!("loaded {path:?} with shape {:?}", table.dim());
    Ok(table)
}

fn parse_cell(cell: Option<&str>, i_row: usize, i_col: usize) -> std::result::Result<f64, String> {
    let cell = cell.ok_or_else(|| {
        format!("row {i_row} has a missing cell in column {i_col}, rows have inconsistent lengths")
    })?;
    cell.parse()
        .map_err(|_| format!("row {i_row} column {i_col} is not numeric: {cell:?}"))
}

#[derive(Deserialize)]
struct Record {
    observations: Vec<f64>,
}

/// Load a table from a JSON document.
///
/// Expected format, one object per subject:
/// ```json
/// [
///     { "observations": [0, 1] },
///     { "observations": [0, 2] }
/// ]
/// ```
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let records: Vec<Record> =
        serde_json::from_reader(reader).map_err(|err| Error::parse(path, err))?;

    let rows: Vec<_> = records.into_iter().map(|rec| rec.observations).collect();
    let table = stack_rows(rows).map_err(|reason| Error::parse(path, reason))?;

    log::debug!("loaded {path:?} with shape {:?}", table.dim());
    Ok(table)
}

fn stack_rows(rows: Vec<Vec<f64>>) -> std::result::Result<Table, String> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(Vec::len).ok_or("file contains no rows")?;
    if let Some(i_row) = rows.iter().position(|row| row.len() != n_cols) {
        return Err(format!(
            "row {i_row} has {} values, but row 0 has {n_cols}",
            rows[i_row].len()
        ));
    }

    let flat = rows.into_iter().flatten().collect();
    Table::from_shape_vec((n_rows, n_cols), flat).map_err(|err| err.to_string())
}

/// Convert an untyped JSON value into an n-dimensional numeric array.
///
/// Nested arrays must be rectangular. `null` leaves become NaN.
///
/// # Errors
/// Returns [`Error::Type`] if any leaf is not a number (or `null`), and
/// [`Error::Shape`] if the nesting is ragged.
pub fn numeric_array(value: &Value) -> Result<ArrayD<f64>> {
    let mut walker = Walker::default();
    walker.visit(value, 0)?;
    ArrayD::from_shape_vec(IxDyn(&walker.shape), walker.values)
        .map_err(|err| Error::Shape(err.to_string()))
}

#[derive(Default)]
struct Walker {
    shape: Vec<usize>,
    leaf_depth: Option<usize>,
    values: Vec<f64>,
}

impl Walker {
    fn visit(&mut self, value: &Value, depth: usize) -> Result<()> {
        match value {
            Value::Array(items) => {
                if self.leaf_depth.is_some_and(|leaf_depth| depth >= leaf_depth) {
                    return Err(Error::Shape("array nesting is ragged".to_string()));
                }
                if depth < self.shape.len() {
                    let exp_len = self.shape[depth];
                    if items.len() != exp_len {
                        return Err(Error::Shape(format!(
                            "arrays at depth {depth} must have length {exp_len}, but one has {}",
                            items.len()
                        )));
                    }
                } else {
                    self.shape.push(items.len());
                }
                for item in items {
                    self.visit(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Number(num) => {
                let val = num
                    .as_f64()
                    .ok_or_else(|| Error::Type(format!("{num} is not representable as f64")))?;
                self.push_leaf(val, depth)
            }
            Value::Null => self.push_leaf(f64::NAN, depth),
            other => Err(Error::Type(format!(
                "data must be a numeric array, but contains {other}"
            ))),
        }
    }

    fn push_leaf(&mut self, val: f64, depth: usize) -> Result<()> {
        match self.leaf_depth {
            None if depth == self.shape.len() => self.leaf_depth = Some(depth),
            Some(leaf_depth) if depth == leaf_depth => {}
            _ => return Err(Error::Shape("array nesting is ragged".to_string())),
        }
        self.values.push(val);
        Ok(())
    }
}

/// Convert an untyped JSON value into a [`Table`].
pub fn table_from_value(value: &Value) -> Result<Table> {
    let array = numeric_array(value)?;
    let shape = array.shape().to_vec();
    array.into_dimensionality::<Ix2>().map_err(|_| {
        Error::Validation(format!(
            "inflammation table must be 2-dimensional, but has shape {shape:?}"
        ))
    })
}

fn check_subjects(data: ArrayView2<f64>) -> Result<()> {
    if data.nrows() == 0 {
        return Err(Error::Empty);
    }
    Ok(())
}

/// Daily mean across all subjects.
pub fn daily_mean(data: ArrayView2<f64>) -> Result<DayVector> {
    data.mean_axis(Axis(0)).ok_or(Error::Empty)
}

/// Daily maximum across all subjects, ignoring NaN cells.
pub fn daily_max(data: ArrayView2<f64>) -> Result<DayVector> {
    check_subjects(data)?;
    Ok(data.fold_axis(Axis(0), f64::NAN, |&acc, &val| acc.max(val)))
}

/// Daily minimum across all subjects, ignoring NaN cells.
pub fn daily_min(data: ArrayView2<f64>) -> Result<DayVector> {
    check_subjects(data)?;
    Ok(data.fold_axis(Axis(0), f64::NAN, |&acc, &val| acc.min(val)))
}

/// Daily population standard deviation across all subjects.
pub fn daily_std(data: ArrayView2<f64>) -> Result<DayVector> {
    check_subjects(data)?;
    Ok(data.std_axis(Axis(0), 0.0))
}

/// Population standard deviation of a single series.
pub fn std_dev(values: ArrayView1<f64>) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::Empty);
    }
    Ok(values.std(0.0))
}

/// Normalise each subject's series by that subject's maximum.
///
/// The row maximum ignores NaN cells. Cells that come out as NaN are set to 0,
/// and so are negative results, so every output lies in [0, 1].
///
/// # Errors
/// Returns [`Error::Validation`] if `data` is not 2-dimensional or holds any
/// negative value.
pub fn patient_normalise(data: ArrayViewD<f64>) -> Result<Table> {
    let shape = data.shape().to_vec();
    let data = data.into_dimensionality::<Ix2>().map_err(|_| {
        Error::Validation(format!(
            "shape of inflammation array should be 2-dimensional, but is {shape:?}"
        ))
    })?;
    if data.iter().any(|&val| val < 0.0) {
        return Err(Error::Validation(
            "negative values are not allowed".to_string(),
        ));
    }

    let max_data = data.fold_axis(Axis(1), f64::NAN, |&acc, &val| acc.max(val));
    let mut normalised = &data / &max_data.insert_axis(Axis(1));

    let n_nan = normalised.iter().filter(|val| val.is_nan()).count();
    if n_nan > 0 {
        log::warn!("replaced {n_nan} NaN cells with 0 during normalisation");
    }
    normalised.mapv_inplace(|val| if val.is_nan() || val < 0.0 { 0.0 } else { val });

    Ok(normalised)
}

/// Run [`patient_normalise`] on untyped input.
///
/// # Errors
/// Returns [`Error::Type`] if `value` is not a numeric array, otherwise the
/// errors of [`patient_normalise`].
pub fn patient_normalise_value(value: &Value) -> Result<Table> {
    let array = numeric_array(value)?;
    patient_normalise(array.view())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};
    use serde_json::json;
    use tempfile::TempDir;

    fn assert_close<D: ndarray::Dimension>(got: &Array<f64, D>, exp: &Array<f64, D>, tol: f64) {
        assert_eq!(got.shape(), exp.shape(), "shape mismatch");
        for (g, e) in got.iter().zip(exp.iter()) {
            assert!((g - e).abs() <= tol, "got {got}, expected {exp}");
        }
    }

    #[test]
    fn daily_mean_of_zeros_and_integers() {
        let zeros = array![[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
        assert_eq!(daily_mean(zeros.view()).unwrap(), array![0.0, 0.0]);

        let ints = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        assert_eq!(daily_mean(ints.view()).unwrap(), array![3.0, 4.0]);
    }

    #[test]
    fn daily_max_and_min_with_negatives() {
        let data = array![[-3.0, 5.0], [4.0, 1.0], [8.0, -1.0]];
        assert_eq!(daily_max(data.view()).unwrap(), array![8.0, 5.0]);
        assert_eq!(daily_min(data.view()).unwrap(), array![-3.0, -1.0]);

        let zeros = Table::zeros((3, 2));
        assert_eq!(daily_max(zeros.view()).unwrap(), array![0.0, 0.0]);
        assert_eq!(daily_min(zeros.view()).unwrap(), array![0.0, 0.0]);
    }

    #[test]
    fn reductions_keep_one_value_per_day() {
        let data = Table::from_shape_fn((4, 7), |(i, j)| (i * 7 + j) as f64);
        assert_eq!(daily_mean(data.view()).unwrap().len(), 7);
        assert_eq!(daily_max(data.view()).unwrap().len(), 7);
        assert_eq!(daily_min(data.view()).unwrap().len(), 7);
        assert_eq!(daily_std(data.view()).unwrap().len(), 7);
    }

    #[test]
    fn reductions_reject_empty_table() {
        let empty = Table::zeros((0, 3));
        assert!(matches!(daily_mean(empty.view()), Err(Error::Empty)));
        assert!(matches!(daily_max(empty.view()), Err(Error::Empty)));
        assert!(matches!(daily_min(empty.view()), Err(Error::Empty)));
        assert!(matches!(daily_std(empty.view()), Err(Error::Empty)));
    }

    #[test]
    fn daily_min_of_strings_is_type_error() {
        let result = table_from_value(&json!([["Hello", "there"], ["General", "Kenobi"]]))
            .and_then(|data| daily_min(data.view()));
        assert!(matches!(result, Err(Error::Type(_))));
    }

    #[test]
    fn std_dev_uses_population_formula() {
        for (vals, exp) in [
            (vec![0.0, 0.0, 0.0], 0.0),
            (vec![1.0, 1.0, 1.0], 0.0),
            (vec![0.0, 2.0], 1.0),
            (vec![-1.0, 1.0], 1.0),
        ] {
            let vals = Array1::from(vals);
            assert!((std_dev(vals.view()).unwrap() - exp).abs() < 1e-12);

            let column = vals.insert_axis(Axis(1));
            assert_close(&daily_std(column.view()).unwrap(), &array![exp], 1e-12);
        }
    }

    #[test]
    fn daily_std_matches_population_definition() {
        let data = array![[1.0, 2.0], [3.0, 4.0], [5.0, 9.0]];
        let exp = array![(8.0f64 / 3.0).sqrt(), (26.0f64 / 3.0).sqrt()];
        assert_close(&daily_std(data.view()).unwrap(), &exp, 1e-12);
    }

    #[test]
    fn patient_normalise_fixed_points() {
        let zeros = Table::zeros((3, 3));
        assert_eq!(patient_normalise(zeros.view().into_dyn()).unwrap(), zeros);

        let ones = Table::ones((3, 3));
        assert_eq!(patient_normalise(ones.view().into_dyn()).unwrap(), ones);
    }

    #[test]
    fn patient_normalise_positive_integers() {
        let data = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
        let exp = array![[0.33, 0.67, 1.0], [0.67, 0.83, 1.0], [0.78, 0.89, 1.0]];
        assert_close(&patient_normalise(data.view().into_dyn()).unwrap(), &exp, 1e-2);
    }

    #[test]
    fn patient_normalise_rejects_negatives() {
        for data in [
            array![[-1.0, -1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0, -1.0, -1.0]],
            array![[-1.0, -1.0, 1.0], [-1.0, -1.0, 1.0], [-1.0, -1.0, 1.0]],
        ] {
            let result = patient_normalise(data.view().into_dyn());
            assert!(matches!(result, Err(Error::Validation(_))));
        }
    }

    #[test]
    fn patient_normalise_replaces_nan_with_zero() {
        let nan = f64::NAN;
        let data = array![[nan, nan, nan], [4.0, nan, 6.0], [7.0, 8.0, 9.0]];
        let exp = array![[0.0, 0.0, 0.0], [0.67, 0.0, 1.0], [0.78, 0.89, 1.0]];

        let result = patient_normalise(data.view().into_dyn()).unwrap();
        assert_close(&result, &exp, 1e-2);
        assert!(result.iter().all(|val| (0.0..=1.0).contains(val)));
    }

    #[test]
    fn patient_normalise_rejects_bad_input() {
        let result = patient_normalise_value(&json!("I do not belong here"));
        assert!(matches!(result, Err(Error::Type(_))));

        let result = patient_normalise_value(&json!([0, 0, 0]));
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = patient_normalise_value(&json!([[[1, 2]], [[3, 4]]]));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn numeric_array_shapes_and_nulls() {
        let array = numeric_array(&json!([[1, 2, 3], [4, null, 6]])).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert!(array[[1, 1]].is_nan());

        let scalar = numeric_array(&json!(5.5)).unwrap();
        assert_eq!(scalar.ndim(), 0);

        assert!(matches!(
            numeric_array(&json!([[1, 2], [3]])),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            numeric_array(&json!([1, [2]])),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            numeric_array(&json!([[1], 2])),
            Err(Error::Shape(_))
        ));
        assert!(matches!(
            numeric_array(&json!({ "observations": [1] })),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path("a/inflammation-01.csv").unwrap(), Format::Csv);
        assert_eq!(Format::from_path("inflammation.json").unwrap(), Format::Json);

        match Format::from_path("inflammation.txt") {
            Err(Error::UnsupportedFormat(ext)) => assert_eq!(ext, ".txt"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            Format::from_path("inflammation"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn load_csv_reads_grid() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("inflammation-01.csv");
        fs::write(&file, "0,1,2\n3,4.5,5\n").unwrap();

        let table = load_table(&file, Format::Csv).unwrap();
        assert_eq!(table, array![[0.0, 1.0, 2.0], [3.0, 4.5, 5.0]]);
    }

    #[test]
    fn load_csv_accepts_loose_numeric_grids() {
        let dir = TempDir::new().unwrap();
        let cases = [
            ("spaced.csv", "1, 2\n3, 4\n"),
            ("trailing-blank.csv", "1,2\n3,4\n\n"),
            ("nan.csv", "1,nan\n3,4\n"),
            ("wide-int.csv", "18446744073709551616,1\n2,3\n"),
        ];
        let mut tables = Vec::new();
        for (name, contents) in cases {
            let file = dir.path().join(name);
            fs::write(&file, contents).unwrap();
            let table = load_csv(&file).unwrap_or_else(|err| panic!("{name}: {err}"));
            assert_eq!(table.dim(), (2, 2), "{name}");
            tables.push(table);
        }

        assert_eq!(tables[0], array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(tables[1], array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(tables[2][[0, 1]].is_nan());
        assert_eq!(tables[2][[1, 0]], 3.0);
        assert_eq!(tables[3][[0, 0]], 18446744073709551616.0);
        assert_eq!(tables[3][[1, 1]], 3.0);
    }

    #[test]
    fn load_csv_rejects_malformed_content() {
        let dir = TempDir::new().unwrap();

        let non_numeric = dir.path().join("non-numeric.csv");
        fs::write(&non_numeric, "1,2\nfoo,4\n").unwrap();
        assert!(matches!(load_csv(&non_numeric), Err(Error::Parse { .. })));

        let ragged = dir.path().join("ragged.csv");
        fs::write(&ragged, "1,2,3\n4,5\n").unwrap();
        assert!(matches!(load_csv(&ragged), Err(Error::Parse { .. })));

        let missing = dir.path().join("missing.csv");
        assert!(matches!(load_csv(&missing), Err(Error::Io { .. })));
    }

    #[test]
    fn load_json_reads_observations() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("inflammation-01.json");
        fs::write(
            &file,
            r#"[{"observations": [0, 1]}, {"observations": [0, 2]}]"#,
        )
        .unwrap();

        let table = load_table(&file, Format::Json).unwrap();
        assert_eq!(table, array![[0.0, 1.0], [0.0, 2.0]]);
    }

    #[test]
    fn load_json_rejects_malformed_content() {
        let dir = TempDir::new().unwrap();

        let ragged = dir.path().join("ragged.json");
        fs::write(
            &ragged,
            r#"[{"observations": [0, 1, 2]}, {"observations": [0, 2]}]"#,
        )
        .unwrap();
        assert!(matches!(load_json(&ragged), Err(Error::Parse { .. })));

        let wrong_key = dir.path().join("wrong-key.json");
        fs::write(&wrong_key, r#"[{"values": [0, 1]}]"#).unwrap();
        assert!(matches!(load_json(&wrong_key), Err(Error::Parse { .. })));

        let not_array = dir.path().join("not-array.json");
        fs::write(&not_array, r#"{"observations": [0, 1]}"#).unwrap();
        assert!(matches!(load_json(&not_array), Err(Error::Parse { .. })));

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "[]").unwrap();
        assert!(matches!(load_json(&empty), Err(Error::Parse { .. })));
    }
}
