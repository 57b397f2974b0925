use crate::color::{interpolate_hcl, Hcl, Rgb, SequentialScale, MISSING_FILL, REGION_STROKE};
use crate::config::MapConfig;
use crate::data::Dataset;
use crate::measure::{ActiveMeasure, MeasureChanged, MeasureSubscriber};
use crate::projection::AlbersUsa;
use crate::tooltip::{TooltipContent, TooltipSurface};
use crate::types::CountyFeature;
use anyhow::{anyhow, Result};
use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use plotters::prelude::{Color, IntoDrawingArea, IntoFont, PathElement, RGBColor, Rectangle, SVGBackend, Text, TextStyle, BLACK};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Idle,
    Recomputing,
}

// Value extent of the active measure. `fallback` is set when no county
// had a finite value and the domain is the default (0, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorDomain {
    pub min: f64,
    pub max: f64,
    pub fallback: bool,
}

impl ColorDomain {
    pub const FALLBACK: ColorDomain = ColorDomain { min: 0.0, max: 1.0, fallback: true };

    pub fn from_values(values: impl Iterator<Item = Option<f64>>) -> Self {
        let extent = values.flatten().filter(|v| v.is_finite()).fold(None, |acc: Option<(f64, f64)>, v| {
            Some(match acc {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            })
        });
        match extent {
            Some((min, max)) => ColorDomain { min, max, fallback: false },
            None => ColorDomain::FALLBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendStop {
    pub color: Rgb,
    pub value: f64,
    // Percent along the strip.
    pub offset: f64,
}

// Round to one decimal, halves toward positive infinity.
pub fn legend_label(value: f64) -> String {
    let rounded = (value * 10.0 + 0.5).floor() / 10.0 + 0.0;
    rounded.to_string()
}

pub struct RegionShape {
    pub feature: usize,
    pub fill: Rgb,
    pub stroke: Rgb,
    // Projected outline, in chart coordinates.
    pub shape: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendView {
    pub title: String,
    pub stops: [LegendStop; 2],
    pub labels: [String; 2],
    pub x: f64,
    pub y: f64,
    pub rect_width: f64,
    pub rect_height: f64,
}

struct RegionIndex {
    region: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct MapScene {
    pub width: f64,
    pub height: f64,
    pub offset: (f64, f64),
    pub regions: Vec<RegionShape>,
    pub legend: LegendView,
    index: RTree<RegionIndex>,
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

impl MapScene {
    pub fn region_at(&self, x: f64, y: f64) -> Option<&RegionShape> {
        let point = Point::new(x, y);
        self.index
            .locate_in_envelope_intersecting(&AABB::from_point([x, y]))
            .filter_map(|candidate| self.regions.get(candidate.region))
            .find(|region| region.shape.contains(&point))
    }

    pub fn to_svg(&self) -> Result<String> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width as u32, self.height as u32)).into_drawing_area();
            let (dx, dy) = self.offset;
            let pixel = |c: &Coord<f64>| ((c.x + dx).round() as i32, (c.y + dy).round() as i32);

            // Regions with holes go first so the enclaves drawn after them stay visible.
            let mut order: Vec<&RegionShape> = self.regions.iter().collect();
            order.sort_by_key(|r| r.shape.iter().all(|p| p.interiors().is_empty()));

            for region in order {
                let fill = rgb(region.fill).filled();
                let stroke = rgb(region.stroke).stroke_width(1);
                for polygon in &region.shape {
                    let exterior: Vec<(i32, i32)> = polygon.exterior().coords().map(pixel).collect();
                    root.draw(&plotters::prelude::Polygon::new(exterior.clone(), fill))?;
                    root.draw(&PathElement::new(exterior, stroke))?;
                    for interior in polygon.interiors() {
                        root.draw(&PathElement::new(interior.coords().map(pixel).collect::<Vec<_>>(), stroke))?;
                    }
                }
            }

            let legend = &self.legend;
            let (x, y) = ((legend.x + dx).round() as i32, (legend.y + dy).round() as i32);
            let (w, h) = (legend.rect_width.round().max(1.0) as i32, legend.rect_height.round() as i32);
            let (light, dark) = (Hcl::from_rgb(legend.stops[0].color), Hcl::from_rgb(legend.stops[1].color));
            for i in 0..w {
                let t = if w > 1 { i as f64 / (w - 1) as f64 } else { 0.0 };
                let color = rgb(interpolate_hcl(light, dark, t));
                root.draw(&Rectangle::new([(x + i, y), (x + i + 1, y + h)], color.filled()))?;
            }

            let font = ("sans-serif", 12).into_font();
            let title_style = TextStyle::from(font.clone()).color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
            root.draw(&Text::new(legend.title.as_str(), (x, y - 10), title_style))?;
            let label_style = TextStyle::from(font).color(&BLACK).pos(Pos::new(HPos::Center, VPos::Center));
            for (label, lx) in legend.labels.iter().zip([x, x + w]) {
                root.draw(&Text::new(label.as_str(), (lx, y + 20), label_style.clone()))?;
            }
            root.present()?;
        }
        Ok(svg)
    }
}

// Pointer position: `x`/`y` relative to the map container, `page_x`/
// `page_y` relative to the page for tooltip placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pointer {
    pub x: f64,
    pub y: f64,
    pub page_x: f64,
    pub page_y: f64,
}

pub struct ChoroplethMap {
    config: MapConfig,
    dataset: Arc<Dataset>,
    measure: ActiveMeasure,
    scale: SequentialScale,
    domain: ColorDomain,
    legend_stops: [LegendStop; 2],
    projection: AlbersUsa,
    state: MapState,
    scene: Option<MapScene>,
}

impl ChoroplethMap {
    pub fn initialize(config: MapConfig, dataset: Arc<Dataset>, measure: ActiveMeasure) -> Result<Self> {
        if dataset.counties.is_empty() {
            return Err(anyhow!("Cannot draw a choropleth without county features"));
        }
        let scale = SequentialScale::default();
        let (light, dark) = scale.range();
        let mut map = Self {
            config,
            dataset,
            measure: measure.clone(),
            scale,
            domain: ColorDomain::FALLBACK,
            legend_stops: [
                LegendStop { color: light, value: 0.0, offset: 0.0 },
                LegendStop { color: dark, value: 1.0, offset: 100.0 },
            ],
            projection: AlbersUsa::new(),
            state: MapState::Idle,
            scene: None,
        };
        map.recompute_domain(measure);
        map.render();
        Ok(map)
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn measure(&self) -> &ActiveMeasure {
        &self.measure
    }

    pub fn domain(&self) -> ColorDomain {
        self.domain
    }

    pub fn legend_stops(&self) -> &[LegendStop; 2] {
        &self.legend_stops
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn scene(&self) -> Option<&MapScene> {
        self.scene.as_ref()
    }

    fn features(&self) -> &[CountyFeature] {
        &self.dataset.counties.features
    }

    fn value_of(&self, feature: &CountyFeature) -> Option<f64> {
        self.measure.value_of(&feature.attributes.indicators)
    }

    pub fn recompute_domain(&mut self, measure: ActiveMeasure) -> ColorDomain {
        self.measure = measure;
        let domain = ColorDomain::from_values(self.features().iter().map(|f| self.value_of(f)));
        self.domain = domain;
        self.scale.set_domain(domain.min, domain.max);

        let (light, dark) = self.scale.range();
        self.legend_stops = [
            LegendStop { color: light, value: domain.min, offset: 0.0 },
            LegendStop { color: dark, value: domain.max, offset: 100.0 },
        ];
        debug!(measure = self.measure.name(), min = domain.min, max = domain.max, fallback = domain.fallback, "recomputed color domain");
        domain
    }

    fn fill_for(&self, value: Option<f64>) -> Rgb {
        match value {
            Some(v) if !self.domain.fallback && v.is_finite() => self.scale.color(v),
            _ => MISSING_FILL,
        }
    }

    pub fn render(&mut self) -> &MapScene {
        let size = self.config.inner_size();
        let dataset = Arc::clone(&self.dataset);
        let features = &dataset.counties.features;
        self.projection.fit_size(size, features.iter().map(|f| &f.geometry));

        let regions: Vec<RegionShape> = features
            .iter()
            .enumerate()
            .map(|(i, feature)| {
                let shape = self.projection.project_multi_polygon(&feature.geometry);
                RegionShape {
                    feature: i,
                    fill: self.fill_for(self.value_of(feature)),
                    stroke: REGION_STROKE,
                    shape,
                }
            })
            .collect();

        let index = RTree::bulk_load(
            regions
                .iter()
                .enumerate()
                .filter_map(|(i, region)| {
                    region.shape.bounding_rect().map(|rect| RegionIndex {
                        region: i,
                        aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                    })
                })
                .collect(),
        );

        let legend_config = self.config.legend;
        let legend = LegendView {
            title: self.measure.name().to_string(),
            stops: self.legend_stops,
            labels: [legend_label(self.legend_stops[0].value), legend_label(self.legend_stops[1].value)],
            x: legend_config.left,
            y: size.1 - legend_config.bottom,
            rect_width: legend_config.rect_width,
            rect_height: legend_config.rect_height,
        };

        self.scene.insert(MapScene {
            width: self.config.container_width,
            height: self.config.container_height,
            offset: (self.config.margin.left, self.config.margin.top),
            regions,
            legend,
            index,
        })
    }

    // Switch the active measure. Names outside the registry are kept and
    // render every county as missing.
    pub fn set_measure(&mut self, name: &str) {
        let measure = ActiveMeasure::resolve(name);
        if let ActiveMeasure::Unregistered(name) = &measure {
            warn!(measure = %name, "selected measure is not registered, rendering all counties as missing");
        }
        self.state = MapState::Recomputing;
        debug!(measure = measure.name(), "choropleth recomputing");
        self.recompute_domain(measure);
        self.render();
        self.state = MapState::Idle;
        debug!("choropleth idle");
    }

    pub fn hover(&self, index: usize, page_x: f64, page_y: f64, tooltip: &mut dyn TooltipSurface) {
        let Some(feature) = self.features().get(index) else {
            tooltip.hide();
            return;
        };
        let padding = self.config.tooltip_padding;
        let content = TooltipContent::for_region(feature.display_title(), self.measure.name(), self.value_of(feature));
        tooltip.show(page_x + padding, page_y + padding, content);
    }

    pub fn pointer_move(&self, pointer: Pointer, tooltip: &mut dyn TooltipSurface) -> Option<usize> {
        let scene = self.scene.as_ref()?;
        let (x, y) = (pointer.x - scene.offset.0, pointer.y - scene.offset.1);
        match scene.region_at(x, y) {
            Some(region) => {
                self.hover(region.feature, pointer.page_x, pointer.page_y, tooltip);
                Some(region.feature)
            }
            None => {
                tooltip.hide();
                None
            }
        }
    }

    pub fn pointer_leave(&self, tooltip: &mut dyn TooltipSurface) {
        tooltip.hide();
    }
}

impl MeasureSubscriber for ChoroplethMap {
    fn measure_changed(&mut self, event: &MeasureChanged) {
        self.set_measure(&event.0);
    }
}
