use crate::charts;
use crate::choropleth::ChoroplethMap;
use crate::config::AppConfig;
use crate::data::Dataset;
use crate::measure::MeasureKey;
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

// Write one choropleth per registered measure plus the auxiliary charts.
pub fn generate_outputs(config: &AppConfig, dataset: Arc<Dataset>) -> Result<Vec<PathBuf>> {
    let dir = &config.output.dir;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {:?}", dir))?;

    info!("Rendering {} choropleth maps into {:?}", MeasureKey::COUNT, dir);
    let mut written = MeasureKey::ALL
        .par_iter()
        .map(|&key| {
            let map = ChoroplethMap::initialize(config.map.clone(), Arc::clone(&dataset), key.into())?;
            let scene = map.scene().ok_or_else(|| anyhow!("Choropleth for {} was not rendered", key))?;
            write_file(&dir.join(format!("choropleth_{}.svg", key)), &scene.to_svg()?)
        })
        .collect::<Result<Vec<_>>>()?;

    let records = &dataset.records;
    let charts_config = &config.charts;
    for key in [MeasureKey::Poverty, MeasureKey::PercentHighBloodPressure] {
        let svg = charts::histogram_svg(records, key, charts_config)?;
        written.push(write_file(&dir.join(format!("histogram_{}.svg", key)), &svg)?);
    }

    let scatter = charts::scatter_svg(records, charts_config.scatter_x, charts_config.scatter_y, charts_config)?;
    written.push(write_file(&dir.join("scatter.svg"), &scatter)?);

    let bars = charts::grouped_bar_svg(records, charts_config)?;
    written.push(write_file(&dir.join("grouped_bar.svg"), &bars)?);

    info!("Wrote {} files", written.len());
    Ok(written)
}

fn write_file(path: &Path, contents: &str) -> Result<PathBuf> {
    fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path.to_path_buf())
}
