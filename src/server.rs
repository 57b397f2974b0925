use crate::charts;
use crate::choropleth::{ChoroplethMap, Pointer};
use crate::config::AppConfig;
use crate::data::Dataset;
use crate::measure::{MeasureKey, MeasureSelect, MeasureSubscriber, SelectOption};
use crate::tooltip::TooltipState;
use anyhow::{anyhow, Result};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

pub struct Dashboard {
    select: MeasureSelect,
    map: ChoroplethMap,
    tooltip: TooltipState,
}

impl Dashboard {
    pub fn new(config: &AppConfig, dataset: Arc<Dataset>) -> Result<Self> {
        let initial = config.map.default_measure;
        Ok(Self {
            select: MeasureSelect::new(initial),
            map: ChoroplethMap::initialize(config.map.clone(), dataset, initial.into())?,
            tooltip: TooltipState::default(),
        })
    }

    pub fn select_measure(&mut self, value: &str) {
        let subscribers: &mut [&mut dyn MeasureSubscriber] = &mut [&mut self.map];
        self.select.change_and_notify(value, subscribers);
    }

    pub fn map_svg(&self) -> Result<String> {
        match self.map.scene() {
            Some(scene) => scene.to_svg(),
            None => Ok(String::new()),
        }
    }

    pub fn pointer_move(&mut self, pointer: Pointer) -> &TooltipState {
        self.map.pointer_move(pointer, &mut self.tooltip);
        &self.tooltip
    }

    pub fn pointer_leave(&mut self) -> &TooltipState {
        self.map.pointer_leave(&mut self.tooltip);
        &self.tooltip
    }

    pub fn options(&self) -> &[SelectOption] {
        self.select.options()
    }

    pub fn index_page(&self) -> Result<String> {
        let options: String = self
            .select
            .options()
            .iter()
            .map(|o| {
                let selected = if o.value == self.select.value() { " selected" } else { "" };
                // Values and labels come from the registry's snake_case names.
                format!("<option value=\"{}\"{}>{}</option>", o.value, selected, o.label)
            })
            .collect();
        Ok(INDEX_HTML.replace("{{options}}", &options).replace("{{map}}", &self.map_svg()?))
    }
}

pub struct AppState {
    pub dashboard: Mutex<Dashboard>,
    pub dataset: Arc<Dataset>,
    pub config: AppConfig,
}

impl AppState {
    fn dashboard(&self) -> Result<MutexGuard<'_, Dashboard>, AppError> {
        self.dashboard.lock().map_err(|_| AppError(anyhow!("Dashboard state poisoned")))
    }
}

pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Deserialize)]
pub struct MapParams {
    measure: Option<String>,
}

#[derive(Deserialize)]
pub struct HoverParams {
    x: f64,
    y: f64,
    page_x: f64,
    page_y: f64,
}

#[derive(Deserialize)]
pub struct ScatterParams {
    x: Option<String>,
    y: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.output.dir);
    Router::new()
        .route("/", get(index_handler))
        .route("/api/measures", get(measures_handler))
        .route("/api/map", get(map_handler))
        .route("/api/hover", get(hover_handler))
        .route("/api/leave", get(leave_handler))
        .route("/charts/histogram/:measure", get(histogram_handler))
        .route("/charts/scatter", get(scatter_handler))
        .route("/charts/grouped-bar", get(grouped_bar_handler))
        .nest_service("/static", static_files)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dataset: Arc<Dataset>) -> Result<()> {
    let dashboard = Dashboard::new(&config, Arc::clone(&dataset))?;
    let port = config.server.port;
    let state = Arc::new(AppState { dashboard: Mutex::new(dashboard), dataset, config });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn svg_response(svg: String) -> Response {
    ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response()
}

fn parse_measure(name: &str) -> Result<MeasureKey, Response> {
    name.parse::<MeasureKey>().map_err(|e| (StatusCode::NOT_FOUND, e.to_string()).into_response())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    Ok(Html(state.dashboard()?.index_page()?))
}

async fn measures_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<SelectOption>>, AppError> {
    Ok(Json(state.dashboard()?.options().to_vec()))
}

async fn map_handler(State(state): State<Arc<AppState>>, Query(params): Query<MapParams>) -> Result<Response, AppError> {
    let mut dashboard = state.dashboard()?;
    if let Some(measure) = params.measure.as_deref() {
        dashboard.select_measure(measure);
    }
    Ok(svg_response(dashboard.map_svg()?))
}

async fn hover_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HoverParams>,
) -> Result<Json<TooltipState>, AppError> {
    let mut dashboard = state.dashboard()?;
    let pointer = Pointer { x: params.x, y: params.y, page_x: params.page_x, page_y: params.page_y };
    Ok(Json(dashboard.pointer_move(pointer).clone()))
}

async fn leave_handler(State(state): State<Arc<AppState>>) -> Result<Json<TooltipState>, AppError> {
    let mut dashboard = state.dashboard()?;
    Ok(Json(dashboard.pointer_leave().clone()))
}

async fn histogram_handler(State(state): State<Arc<AppState>>, Path(measure): Path<String>) -> Result<Response, AppError> {
    let key = match parse_measure(measure.trim_end_matches(".svg")) {
        Ok(key) => key,
        Err(response) => return Ok(response),
    };
    let svg = charts::histogram_svg(&state.dataset.records, key, &state.config.charts)?;
    Ok(svg_response(svg))
}

async fn scatter_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScatterParams>,
) -> Result<Response, AppError> {
    let charts_config = &state.config.charts;
    let x = match params.x.as_deref().map(parse_measure).transpose() {
        Ok(x) => x.unwrap_or(charts_config.scatter_x),
        Err(response) => return Ok(response),
    };
    let y = match params.y.as_deref().map(parse_measure).transpose() {
        Ok(y) => y.unwrap_or(charts_config.scatter_y),
        Err(response) => return Ok(response),
    };
    let svg = charts::scatter_svg(&state.dataset.records, x, y, charts_config)?;
    Ok(svg_response(svg))
}

async fn grouped_bar_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let svg = charts::grouped_bar_svg(&state.dataset.records, &state.config.charts)?;
    Ok(svg_response(svg))
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>County Health Indicators</title>
<style>
  body { font-family: sans-serif; }
  #tooltip { position: absolute; display: none; background: #fff; border: 1px solid #999; padding: 6px; pointer-events: none; }
  .tooltip-title { font-weight: bold; }
  .charts img { margin: 8px; }
</style>
</head>
<body>
<label for="measureSelect">Measure</label>
<select id="measureSelect">{{options}}</select>
<div id="map">{{map}}</div>
<div id="tooltip"></div>
<div class="charts">
  <img src="/charts/histogram/poverty.svg" alt="Poverty histogram">
  <img src="/charts/histogram/percent_high_blood_pressure.svg" alt="High blood pressure histogram">
  <img src="/charts/grouped-bar" alt="Top 10 counties">
</div>
<div class="charts">
  <select id="xSelect">{{options}}</select>
  <select id="ySelect">{{options}}</select>
  <div><img id="scatter" src="/charts/scatter" alt="Scatter plot"></div>
</div>
<script>
  const select = document.getElementById('measureSelect');
  const map = document.getElementById('map');
  const tooltip = document.getElementById('tooltip');
  const apply = (t) => {
    tooltip.style.display = t.visible ? 'block' : 'none';
    if (t.visible) {
      tooltip.style.left = t.left + 'px';
      tooltip.style.top = t.top + 'px';
      const title = document.createElement('div');
      title.className = 'tooltip-title';
      title.textContent = t.content.title;
      const label = document.createElement('strong');
      label.textContent = t.content.measure + ':';
      const body = document.createElement('div');
      body.append(label, ' ' + t.content.value);
      tooltip.replaceChildren(title, body);
    }
  };
  select.addEventListener('change', async () => {
    const res = await fetch('/api/map?measure=' + encodeURIComponent(select.value));
    map.innerHTML = await res.text();
  });
  map.addEventListener('mousemove', async (e) => {
    const r = map.getBoundingClientRect();
    const q = new URLSearchParams({ x: e.clientX - r.left, y: e.clientY - r.top, page_x: e.pageX, page_y: e.pageY });
    apply(await (await fetch('/api/hover?' + q)).json());
  });
  map.addEventListener('mouseleave', async () => apply(await (await fetch('/api/leave')).json()));
  const xSelect = document.getElementById('xSelect');
  const ySelect = document.getElementById('ySelect');
  xSelect.value = 'poverty';
  ySelect.value = 'percent_high_blood_pressure';
  const updateScatter = () => {
    document.getElementById('scatter').src = '/charts/scatter?x=' + xSelect.value + '&y=' + ySelect.value;
  };
  xSelect.addEventListener('change', updateScatter);
  ySelect.addEventListener('change', updateScatter);
</script>
</body>
</html>
"#;
