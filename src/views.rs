use crate::models::{DayVector, Table};
use anyhow::{Context, Result};
use ndarray::ArrayView1;
use plotters::prelude::*;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

/// A labelled quantity handed over for display.
#[derive(Debug, Clone, PartialEq)]
pub enum Series {
    Day(DayVector),
    Table(Table),
}

impl From<DayVector> for Series {
    fn from(vec: DayVector) -> Self {
        Series::Day(vec)
    }
}

impl From<Table> for Series {
    fn from(table: Table) -> Self {
        Series::Table(table)
    }
}

/// Labels mapped to series, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct SeriesMap {
    entries: Vec<(String, Series)>,
}

impl SeriesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `series` under `label`.
    ///
    /// An existing label keeps its position and gets its series replaced; the
    /// old series is returned.
    pub fn insert<K: Into<String>, V: Into<Series>>(&mut self, label: K, series: V) -> Option<Series> {
        let label = label.into();
        let series = series.into();
        match self.entries.iter_mut().find(|(key, _)| *key == label) {
            Some((_, old)) => Some(std::mem::replace(old, series)),
            None => {
                self.entries.push((label, series));
                None
            }
        }
    }

    pub fn get(&self, label: &str) -> Option<&Series> {
        self.entries
            .iter()
            .find(|(key, _)| key == label)
            .map(|(_, series)| series)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.entries
            .iter()
            .map(|(label, series)| (label.as_str(), series))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Series>> FromIterator<(K, V)> for SeriesMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (label, series) in iter {
            map.insert(label, series);
        }
        map
    }
}

pub trait Render {
    fn render(&mut self, title: &str, data: &SeriesMap) -> Result<()>;
}

/// Writes every series as fixed-precision text.
pub struct TextRenderer<W: Write> {
    out: W,
    precision: usize,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(out: W, precision: usize) -> Self {
        Self { out, precision }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn format_row(&self, row: ArrayView1<f64>) -> String {
        row.iter()
            .map(|val| format!("{val:.precision$}", precision = self.precision))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<W: Write> Render for TextRenderer<W> {
    fn render(&mut self, title: &str, data: &SeriesMap) -> Result<()> {
        writeln!(self.out, "# {title}")?;
        for (label, series) in data.iter() {
            match series {
                Series::Day(vec) => {
                    let row = self.format_row(vec.view());
                    writeln!(self.out, "{label}: {row}")?;
                }
                Series::Table(table) => {
                    writeln!(self.out, "{label}:")?;
                    for (i_row, row) in table.outer_iter().enumerate() {
                        let row = self.format_row(row);
                        writeln!(self.out, "  {i_row:>3}: {row}")?;
                    }
                }
            }
        }
        writeln!(self.out)?;
        self.out.flush().context("failed to flush output")?;
        Ok(())
    }
}

/// Draws one SVG file per render call, one line chart per label.
///
/// Titles are sanitized into file stems; a title whose stem is already taken
/// by a different title gets a `-<n>` suffix instead of overwriting it.
pub struct SvgRenderer {
    plot_dir: PathBuf,
    size: (u32, u32),
    owners: HashMap<String, String>,
}

impl SvgRenderer {
    pub fn new<P: AsRef<Path>>(plot_dir: P, size: (u32, u32)) -> Result<Self> {
        let plot_dir = plot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&plot_dir).with_context(|| format!("failed to create {plot_dir:?}"))?;
        Ok(Self {
            plot_dir,
            size,
            owners: HashMap::new(),
        })
    }

    fn plot_file(&mut self, title: &str) -> PathBuf {
        let base: String = title
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        let mut stem = base.clone();
        let mut index = 0;
        while let Some(owner) = self.owners.get(&stem) {
            if owner == title {
                break;
            }
            index += 1;
            stem = format!("{base}-{index}");
        }
        self.owners.insert(stem.clone(), title.to_string());

        self.plot_dir.join(format!("{stem}.svg"))
    }
}

impl Render for SvgRenderer {
    fn render(&mut self, title: &str, data: &SeriesMap) -> Result<()> {
        let file = self.plot_file(title);

        let root = SVGBackend::new(&file, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, ("sans-serif", 24))?;

        let areas = root.split_evenly((data.len().max(1), 1));
        for (area, (label, series)) in areas.iter().zip(data.iter()) {
            let rows: Vec<Vec<f64>> = match series {
                Series::Day(vec) => vec![vec.to_vec()],
                Series::Table(table) => table.outer_iter().map(|row| row.to_vec()).collect(),
            };
            let n_days = rows.iter().map(Vec::len).max().unwrap_or(0);
            let (y_min, y_max) = value_range(&rows);

            let mut chart = ChartBuilder::on(area)
                .caption(label, ("sans-serif", 18))
                .margin(10)
                .x_label_area_size(30)
                .y_label_area_size(50)
                .build_cartesian_2d(0f64..n_days.saturating_sub(1).max(1) as f64, y_min..y_max)?;
            chart.configure_mesh().x_desc("day").draw()?;

            for (i_row, row) in rows.iter().enumerate() {
                let points = row
                    .iter()
                    .enumerate()
                    .filter(|(_, val)| val.is_finite())
                    .map(|(i_day, &val)| (i_day as f64, val));
                chart.draw_series(LineSeries::new(points, &Palette99::pick(i_row)))?;
            }
        }

        root.present()?;
        log::info!("rendered {file:?}");
        Ok(())
    }
}

fn value_range(rows: &[Vec<f64>]) -> (f64, f64) {
    let (min, max) = rows
        .iter()
        .flatten()
        .filter(|val| val.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &val| {
            (min.min(val), max.max(val))
        });
    if min > max {
        return (0.0, 1.0);
    }
    if min == max {
        return (min - 1.0, max + 1.0);
    }
    let pad = 0.05 * (max - min);
    (min - pad, max + pad)
}
