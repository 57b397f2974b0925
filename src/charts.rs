//! Histogram, scatter and grouped bar charts over the indicator table.
//! Each call is independent and only reads the records it is given.

use crate::config::ChartsConfig;
use crate::measure::MeasureKey;
use crate::types::IndicatorRecord;
use anyhow::Result;
use plotters::prelude::*;
use std::cmp::Ordering;

const STEELBLUE: RGBColor = RGBColor(70, 130, 180);
const ORANGE: RGBColor = RGBColor(255, 165, 0);

// Step between ticks for roughly `count` ticks over [start, stop].
// Negative results are inverted steps (exact for fractional steps).
fn tick_increment(start: f64, stop: f64, count: usize) -> f64 {
    let step = (stop - start) / count.max(1) as f64;
    let power = step.log10().floor();
    let error = step / 10f64.powf(power);
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    if power >= 0.0 {
        factor * 10f64.powf(power)
    } else {
        -10f64.powf(-power) / factor
    }
}

pub fn ticks(start: f64, stop: f64, count: usize) -> Vec<f64> {
    if count == 0 || !(start.is_finite() && stop.is_finite()) {
        return Vec::new();
    }
    if start == stop {
        return vec![start];
    }
    let inc = tick_increment(start, stop, count);
    if inc == 0.0 || !inc.is_finite() {
        return Vec::new();
    }
    if inc > 0.0 {
        let (r0, r1) = ((start / inc).ceil() as i64, (stop / inc).floor() as i64);
        (r0..=r1).map(|i| i as f64 * inc).collect()
    } else {
        let inv = -inc;
        let (r0, r1) = ((start * inv).ceil() as i64, (stop * inv).floor() as i64);
        (r0..=r1).map(|i| i as f64 / inv).collect()
    }
}

pub fn nice(start: f64, stop: f64, count: usize) -> (f64, f64) {
    let (mut start, mut stop) = (start, stop);
    if !(start.is_finite() && stop.is_finite()) || start >= stop {
        return (start, stop);
    }
    let mut previous = None;
    for _ in 0..10 {
        let step = tick_increment(start, stop, count);
        if previous == Some(step) {
            break;
        }
        if step > 0.0 {
            start = (start / step).floor() * step;
            stop = (stop / step).ceil() * step;
        } else if step < 0.0 {
            start = (start * step).ceil() / step;
            stop = (stop * step).floor() / step;
        } else {
            break;
        }
        previous = Some(step);
    }
    (start, stop)
}

pub fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.filter(|v| v.is_finite()).fold(None, |acc, v| match acc {
        Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        None => Some((v, v)),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    pub x0: f64,
    pub x1: f64,
    pub count: usize,
}

// Bin values over `domain` at tick thresholds. The last bin is closed.
pub fn bin(values: &[f64], domain: (f64, f64), thresholds: usize) -> Vec<Bin> {
    let (x0, x1) = domain;
    let cuts: Vec<f64> = ticks(x0, x1, thresholds).into_iter().filter(|t| *t > x0 && *t < x1).collect();

    let mut edges = Vec::with_capacity(cuts.len() + 2);
    edges.push(x0);
    edges.extend(cuts.iter().copied());
    edges.push(x1);

    let mut bins: Vec<Bin> = edges.windows(2).map(|w| Bin { x0: w[0], x1: w[1], count: 0 }).collect();
    for &v in values.iter().filter(|v| v.is_finite() && **v >= x0 && **v <= x1) {
        let idx = cuts.partition_point(|t| *t <= v);
        bins[idx].count += 1;
    }
    bins
}

fn values_of(records: &[IndicatorRecord], key: MeasureKey) -> Vec<f64> {
    records.iter().filter_map(|r| r.indicators.get(key)).collect()
}

// Plotting range; a single value still gets a visible span.
fn padded(range: (f64, f64)) -> (f64, f64) {
    if range.1 > range.0 { range } else { (range.0 - 0.5, range.1 + 0.5) }
}

pub fn histogram_title(key: MeasureKey) -> String {
    match key {
        MeasureKey::Poverty => "Poverty Rate (%)".to_string(),
        MeasureKey::PercentHighBloodPressure => "High Blood Pressure (%)".to_string(),
        other => other.as_str().to_string(),
    }
}

pub fn histogram_svg(records: &[IndicatorRecord], key: MeasureKey, config: &ChartsConfig) -> Result<String> {
    let values = values_of(records, key);
    let domain = extent(values.iter().copied()).map(|(lo, hi)| nice(lo, hi, 10)).unwrap_or((0.0, 1.0));
    let bins = bin(&values, domain, config.histogram_thresholds);
    let max_count = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;
    let (_, y_max) = nice(0.0, max_count.max(1.0), 10);
    let (x0, x1) = padded(domain);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (config.width, config.height)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(histogram_title(key), ("sans-serif", 14))
            .margin(20)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x0..x1, 0f64..y_max)?;
        chart.configure_mesh().disable_mesh().draw()?;
        chart.draw_series(
            bins.iter()
                .filter(|b| b.count > 0)
                .map(|b| Rectangle::new([(b.x0, 0.0), (b.x1, b.count as f64)], STEELBLUE.filled())),
        )?;
        root.present()?;
    }
    Ok(svg)
}

pub fn scatter_points(records: &[IndicatorRecord], x: MeasureKey, y: MeasureKey) -> Vec<(f64, f64)> {
    records
        .iter()
        .filter_map(|r| Some((r.indicators.get(x)?, r.indicators.get(y)?)))
        .collect()
}

pub fn scatter_svg(records: &[IndicatorRecord], x: MeasureKey, y: MeasureKey, config: &ChartsConfig) -> Result<String> {
    let points = scatter_points(records, x, y);
    let x_range = padded(extent(points.iter().map(|p| p.0)).map(|(lo, hi)| nice(lo, hi, 10)).unwrap_or((0.0, 1.0)));
    let y_range = padded(extent(points.iter().map(|p| p.1)).map(|(lo, hi)| nice(lo, hi, 10)).unwrap_or((0.0, 1.0)));

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (config.width, config.height)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(format!("Scatter: {} vs. {}", x, y), ("sans-serif", 14))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(x.as_str())
            .y_desc(y.as_str())
            .draw()?;
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, BLUE.mix(0.6).filled())))?;
        root.present()?;
    }
    Ok(svg)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountyBars {
    pub county: String,
    pub poverty: f64,
    pub blood_pressure: f64,
}

// The ten highest-poverty counties that have both values.
pub fn top_poverty_counties(records: &[IndicatorRecord], limit: usize) -> Vec<CountyBars> {
    let mut rows: Vec<CountyBars> = records
        .iter()
        .filter_map(|r| {
            let poverty = r.indicators.get(MeasureKey::Poverty)?;
            let blood_pressure = r.indicators.get(MeasureKey::PercentHighBloodPressure)?;
            (poverty >= 0.0 && blood_pressure >= 0.0).then(|| CountyBars {
                county: r.display_name.clone(),
                poverty,
                blood_pressure,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.poverty.partial_cmp(&a.poverty).unwrap_or(Ordering::Equal));
    rows.truncate(limit);
    rows
}

pub fn grouped_bar_svg(records: &[IndicatorRecord], config: &ChartsConfig) -> Result<String> {
    let groups = top_poverty_counties(records, 10);
    let max_value = groups.iter().map(|g| g.poverty.max(g.blood_pressure)).fold(0.0, f64::max);
    let (_, y_max) = nice(0.0, max_value.max(1.0), 10);
    let n = groups.len().max(1) as f64;

    // Each county owns a unit band centered on its index.
    let band = 0.8;
    let bar = band / 2.0 * 0.95;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (config.width, config.height)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption("Top 10 Counties: Poverty vs High Blood Pressure", ("sans-serif", 16))
            .margin(20)
            .x_label_area_size(120)
            .y_label_area_size(50)
            .build_cartesian_2d(-0.5f64..(n - 0.5), 0f64..y_max)?;

        let names: Vec<String> = groups.iter().map(|g| g.county.clone()).collect();
        let label_for = |x: &f64| {
            let i = x.round();
            if (x - i).abs() < 1e-6 && i >= 0.0 {
                names.get(i as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        };
        chart
            .configure_mesh()
            .disable_mesh()
            .x_labels(groups.len() + 1)
            .x_label_formatter(&label_for)
            .x_label_style(("sans-serif", 10).into_font().transform(FontTransform::Rotate90))
            .x_desc("County")
            .y_desc("Rate (%)")
            .draw()?;

        chart
            .draw_series(groups.iter().enumerate().map(|(i, g)| {
                let left = i as f64 - band / 2.0;
                Rectangle::new([(left, 0.0), (left + bar, g.poverty)], STEELBLUE.filled())
            }))?
            .label("Poverty (%)")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], STEELBLUE.filled()));

        chart
            .draw_series(groups.iter().enumerate().map(|(i, g)| {
                let right = i as f64 + band / 2.0;
                Rectangle::new([(right - bar, 0.0), (right, g.blood_pressure)], ORANGE.filled())
            }))?
            .label("High BP (%)")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], ORANGE.filled()));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
    }
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::normalize_fips;
    use crate::measure::Indicators;

    fn record(name: &str, poverty: Option<f64>, bp: Option<f64>) -> IndicatorRecord {
        let mut indicators = Indicators::default();
        indicators.set(MeasureKey::Poverty, poverty);
        indicators.set(MeasureKey::PercentHighBloodPressure, bp);
        IndicatorRecord { fips: normalize_fips("1001").unwrap(), display_name: name.into(), indicators }
    }

    #[test]
    fn ticks_are_round_and_inclusive() {
        assert_eq!(ticks(0.0, 1.0, 5), vec![0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
        assert_eq!(ticks(0.0, 100.0, 4), vec![0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        assert_eq!(ticks(3.0, 3.0, 10), vec![3.0]);
    }

    #[test]
    fn nice_extends_to_round_bounds() {
        assert_eq!(nice(0.3, 9.7, 10), (0.0, 10.0));
        assert_eq!(nice(12.0, 87.0, 10), (10.0, 90.0));
    }

    #[test]
    fn bins_cover_the_domain_with_a_closed_last_bin() {
        let values: Vec<f64> = (0..=10).map(|v| v as f64).chain([f64::NAN]).collect();
        let bins = bin(&values, (0.0, 10.0), 20);
        assert_eq!(bins.len(), 20);
        assert_eq!(bins[0].x0, 0.0);
        assert_eq!(bins[19].x1, 10.0);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 11);
        assert_eq!(bins[0].count, 1);
        assert_eq!(bins[1].count, 0);
        assert_eq!(bins[19].count, 1);
    }

    #[test]
    fn top_counties_skip_missing_values_and_sort_by_poverty() {
        let mut records: Vec<IndicatorRecord> =
            (0..12).map(|i| record(&format!("County {i}"), Some(i as f64), Some(30.0))).collect();
        records.push(record("No BP", Some(99.0), None));
        records.push(record("Negative", Some(98.0), Some(-1.0)));

        let top = top_poverty_counties(&records, 10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].county, "County 11");
        assert_eq!(top[9].county, "County 2");
        assert!(top.windows(2).all(|w| w[0].poverty >= w[1].poverty));
    }

    #[test]
    fn scatter_uses_rows_with_both_values() {
        let records = vec![record("a", Some(1.0), Some(2.0)), record("b", None, Some(3.0)), record("c", Some(4.0), Some(5.0))];
        let points = scatter_points(&records, MeasureKey::Poverty, MeasureKey::PercentHighBloodPressure);
        assert_eq!(points, vec![(1.0, 2.0), (4.0, 5.0)]);
    }

    #[test]
    fn charts_render_to_svg() {
        let records: Vec<IndicatorRecord> =
            (0..20).map(|i| record(&format!("County {i}"), Some(i as f64 * 1.5), Some(20.0 + i as f64))).collect();
        let config = ChartsConfig::default();

        let histogram = histogram_svg(&records, MeasureKey::Poverty, &config).unwrap();
        assert!(histogram.contains("<svg"));
        assert!(histogram.contains("Poverty Rate (%)"));

        let scatter = scatter_svg(&records, MeasureKey::Poverty, MeasureKey::PercentHighBloodPressure, &config).unwrap();
        assert!(scatter.contains("Scatter: poverty vs. percent_high_blood_pressure"));

        let bars = grouped_bar_svg(&records, &config).unwrap();
        assert!(bars.contains("Top 10 Counties"));
        assert!(bars.contains("High BP (%)"));
    }

    #[test]
    fn empty_measure_still_renders() {
        let records = vec![record("a", None, None)];
        let svg = histogram_svg(&records, MeasureKey::AirQuality, &ChartsConfig::default()).unwrap();
        assert!(svg.contains("air_quality"));
    }
}
