use crate::compute_data::{FileDataSource, analyse_data};
use crate::config::Config;
use crate::models::{self, Format};
use crate::views::{Render, SeriesMap, SvgRenderer, TextRenderer};
use anyhow::{Context, Result};
use std::{io, path::Path};

/// Runs the analyses asked for on the command line and hands every result to
/// the configured renderers.
pub struct Controller {
    renderers: Vec<Box<dyn Render>>,
    normalise: bool,
}

impl Controller {
    pub fn new(cfg: &Config, normalise: bool) -> Result<Self> {
        let output = &cfg.output;
        let mut renderers: Vec<Box<dyn Render>> =
            vec![Box::new(TextRenderer::new(io::stdout(), output.precision))];
        if let Some(plot_dir) = &output.plot_dir {
            let size = (output.plot_width, output.plot_height);
            let renderer =
                SvgRenderer::new(plot_dir, size).context("failed to construct svg renderer")?;
            renderers.push(Box::new(renderer));
        }
        Ok(Self::with_renderers(renderers, normalise))
    }

    pub fn with_renderers(renderers: Vec<Box<dyn Render>>, normalise: bool) -> Self {
        Self {
            renderers,
            normalise,
        }
    }

    /// Standard deviation by day across every data set next to `file`.
    pub fn analyse_directory<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let data_source = FileDataSource::for_file(file).context("failed to pick data source")?;
        let data_dir = data_source.data_dir();
        log::info!(
            "analysing {} data sets in {data_dir:?}",
            data_source.format().ext()
        );

        let daily_standard_deviation = analyse_data(&data_source)
            .with_context(|| format!("failed to analyse data sets in {data_dir:?}"))?;

        let graph_data =
            SeriesMap::from_iter([("standard deviation by day", daily_standard_deviation)]);
        self.visualize("standard deviation by day", &graph_data)
    }

    /// Daily statistics of a single file.
    pub fn analyse_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        log::info!("analysing {file:?}");

        let format = Format::from_path(file)?;
        let data = models::load_table(file, format)?;
        let data = data.view();

        let mut view_data = SeriesMap::new();
        view_data.insert("average", models::daily_mean(data)?);
        view_data.insert("max", models::daily_max(data)?);
        view_data.insert("min", models::daily_min(data)?);
        if self.normalise {
            let normalised =
                models::patient_normalise(data.into_dyn()).context("failed to normalise data")?;
            view_data.insert("normalised", normalised);
        }

        self.visualize(&file.to_string_lossy(), &view_data)
    }

    fn visualize(&mut self, title: &str, data: &SeriesMap) -> Result<()> {
        for renderer in &mut self.renderers {
            renderer
                .render(title, data)
                .with_context(|| format!("failed to render {title:?}"))?;
        }
        Ok(())
    }
}
