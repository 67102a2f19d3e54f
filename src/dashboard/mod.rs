use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::Database;
use crate::pipeline::{Analyzer, PipelineError};
use crate::provider::ProviderError;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub analyzer: Analyzer,
    pub budget: f64,
}

/// Build the Axum router for the dashboard and JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/history", get(history_handler))
        .route("/api/analyze", post(analyze_handler))
        .route("/api/debrief", post(debrief_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

/// Race reference in request bodies: date + meeting + race numbers.
#[derive(Debug, Deserialize)]
pub struct RaceRef {
    pub date: NaiveDate,
    pub meeting: u32,
    pub race: u32,
}

async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let html = DASHBOARD_HTML.replace(
        r#"<body>"#,
        &format!(r#"<body data-budget="{}">"#, state.budget),
    );
    Html(html)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .get_stats()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /api/history
async fn history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .list_history(100)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// POST /api/analyze
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(race): Json<RaceRef>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .analyzer
        .analyze(race.date, race.meeting, race.race)
        .await
        .map(Json)
        .map_err(map_pipeline_error)
}

/// POST /api/debrief
async fn debrief_handler(
    State(state): State<Arc<AppState>>,
    Json(race): Json<RaceRef>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .analyzer
        .debrief(race.date, race.meeting, race.race)
        .await
        .map(Json)
        .map_err(map_pipeline_error)
}

fn map_pipeline_error(e: PipelineError) -> (StatusCode, String) {
    let status = match &e {
        PipelineError::Provider(ProviderError::NoData(_)) => StatusCode::NOT_FOUND,
        PipelineError::NotAnalyzed => StatusCode::NOT_FOUND,
        PipelineError::Provider(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Engine(_) | PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>TurfPilot</title>
<style>
  :root {
    --bg: #0f1117;
    --card: #1a1d27;
    --border: #2a2d3a;
    --accent: #6c63ff;
    --green: #00c896;
    --red: #ff4f6a;
    --text: #e0e0e0;
    --muted: #8888aa;
  }
  * { box-sizing: border-box; margin: 0; padding: 0; }
  body { background: var(--bg); color: var(--text); font-family: 'Segoe UI', system-ui, sans-serif; }
  header { display: flex; align-items: center; gap: 1rem; padding: 1rem 2rem; border-bottom: 1px solid var(--border); }
  header h1 { font-size: 1.4rem; font-weight: 700; }
  .badge { padding: .2rem .6rem; border-radius: 4px; font-size: .75rem; font-weight: 700; text-transform: uppercase; background: var(--accent); color: #000; }
  main { padding: 1.5rem 2rem; display: grid; gap: 1.5rem; }
  .stats-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 1rem; }
  .stat-card { background: var(--card); border: 1px solid var(--border); border-radius: 10px; padding: 1.2rem; }
  .stat-card .label { color: var(--muted); font-size: .8rem; text-transform: uppercase; letter-spacing: .06em; margin-bottom: .4rem; }
  .stat-card .value { font-size: 1.7rem; font-weight: 700; }
  .value.pos { color: var(--green); }
  .value.neg { color: var(--red); }
  .panel { background: var(--card); border: 1px solid var(--border); border-radius: 10px; overflow: hidden; }
  .panel-header { padding: .9rem 1.2rem; border-bottom: 1px solid var(--border); font-weight: 600; display: flex; justify-content: space-between; align-items: center; }
  table { width: 100%; border-collapse: collapse; }
  th { padding: .7rem 1rem; text-align: left; font-size: .75rem; text-transform: uppercase; color: var(--muted); border-bottom: 1px solid var(--border); }
  td { padding: .65rem 1rem; font-size: .88rem; border-bottom: 1px solid #1e2130; }
  tr:last-child td { border-bottom: none; }
  .pill { display: inline-block; padding: .15rem .55rem; border-radius: 20px; font-size: .75rem; font-weight: 600; }
  .pill.dominant { background: rgba(0,200,150,.15); color: var(--green); }
  .pill.contest { background: rgba(108,99,255,.2); color: var(--accent); }
  .pill.surprise { background: rgba(255,152,0,.15); color: #ff9800; }
  .pill.trap { background: rgba(255,79,106,.15); color: var(--red); }
  .pill.unplayable { background: rgba(136,136,170,.15); color: var(--muted); }
  form { display: flex; gap: .6rem; padding: 1rem 1.2rem; align-items: center; flex-wrap: wrap; }
  input { background: var(--bg); border: 1px solid var(--border); color: var(--text); padding: .45rem .6rem; border-radius: 6px; width: 9rem; }
  button { background: var(--accent); border: none; color: #fff; padding: .5rem 1rem; border-radius: 6px; cursor: pointer; font-weight: 600; }
  button.secondary { background: none; border: 1px solid var(--border); color: var(--muted); }
  button.secondary:hover { border-color: var(--accent); color: var(--accent); }
  pre { padding: 1rem 1.2rem; overflow-x: auto; font-size: .8rem; color: var(--muted); max-height: 28rem; }
  .empty { color: var(--muted); text-align: center; padding: 2rem; font-size: .9rem; }
</style>
</head>
<body>
<header>
  <h1>🏇 TurfPilot</h1>
  <span class="badge" id="budget-badge">…</span>
  <span style="margin-left:auto;color:var(--muted);font-size:.8rem;" id="last-updated"></span>
</header>

<main>
  <div class="stats-grid">
    <div class="stat-card"><div class="label">Analyses</div><div class="value" id="s-analyses">–</div></div>
    <div class="stat-card"><div class="label">Settled Races</div><div class="value" id="s-settled">–</div></div>
    <div class="stat-card"><div class="label">Won / Lost</div><div class="value" id="s-record">–</div></div>
    <div class="stat-card"><div class="label">Total Staked</div><div class="value" id="s-staked">–</div></div>
    <div class="stat-card"><div class="label">Overall ROI</div><div class="value" id="s-roi">–</div></div>
    <div class="stat-card"><div class="label">Avg Top-3 Precision</div><div class="value" id="s-top3">–</div></div>
  </div>

  <div class="panel">
    <div class="panel-header">Analyze a Race</div>
    <form id="race-form" onsubmit="return false;">
      <input type="date" id="f-date" required>
      <input type="number" id="f-meeting" placeholder="Meeting (R)" min="1" required>
      <input type="number" id="f-race" placeholder="Race (C)" min="1" required>
      <button onclick="submitRace('/api/analyze')">Analyze</button>
      <button class="secondary" onclick="submitRace('/api/debrief')">Debrief</button>
    </form>
    <pre id="result" class="empty">No analysis requested yet</pre>
  </div>

  <div class="panel">
    <div class="panel-header">History <button class="secondary" onclick="loadAll()">↻ Refresh</button></div>
    <table>
      <thead><tr><th>Race</th><th>Venue</th><th>Scenario</th><th>Conf.</th><th>Origin</th><th>Staked</th><th>Exp. ROI</th><th>Realized ROI</th><th>Top-3</th></tr></thead>
      <tbody id="history-tbody"><tr><td colspan="9" class="empty">Loading…</td></tr></tbody>
    </table>
  </div>
</main>

<script>
const eur = new Intl.NumberFormat('fr-FR', { style:'currency', currency:'EUR', minimumFractionDigits:2 });
const pct = v => (v*100).toFixed(1)+'%';
const roi = v => v != null ? v.toFixed(2)+'×' : '–';

async function loadStats() {
  const r = await fetch('/api/stats');
  if (!r.ok) return;
  const s = await r.json();
  document.getElementById('s-analyses').textContent = s.total_analyses;
  document.getElementById('s-settled').textContent = s.settled_races;
  document.getElementById('s-record').textContent = s.won_bets + ' / ' + s.lost_bets;
  document.getElementById('s-staked').textContent = eur.format(s.total_staked);
  const roiEl = document.getElementById('s-roi');
  roiEl.textContent = roi(s.overall_roi);
  roiEl.className = 'value ' + (s.overall_roi >= 1.0 ? 'pos' : 'neg');
  document.getElementById('s-top3').textContent = pct(s.avg_top3_precision);
}

async function loadHistory() {
  const r = await fetch('/api/history');
  if (!r.ok) return;
  const rows = await r.json();
  const tbody = document.getElementById('history-tbody');
  if (!rows.length) { tbody.innerHTML = '<tr><td colspan="9" class="empty">No analyses yet</td></tr>'; return; }
  const pillClass = { DOMINANT_FAVORITE:'dominant', OPEN_CONTEST:'contest', SURPRISE:'surprise', TRAP:'trap', UNPLAYABLE:'unplayable' };
  tbody.innerHTML = rows.map(h => `<tr>
    <td>${h.date} R${h.meeting}C${h.race}</td>
    <td>${h.venue}</td>
    <td><span class="pill ${pillClass[h.scenario] || 'contest'}">${h.scenario.replace(/_/g,' ')}</span></td>
    <td>${h.confidence}/10</td>
    <td>${h.origin}</td>
    <td>${eur.format(h.total_stake)}</td>
    <td>${roi(h.expected_roi)}</td>
    <td class="${h.realized_roi != null ? (h.realized_roi >= 1 ? 'pos' : 'neg') : ''}">${roi(h.realized_roi)}</td>
    <td>${h.top3_precision != null ? pct(h.top3_precision) : '–'}</td>
  </tr>`).join('');
}

async function submitRace(endpoint) {
  const date = document.getElementById('f-date').value;
  const meeting = parseInt(document.getElementById('f-meeting').value, 10);
  const race = parseInt(document.getElementById('f-race').value, 10);
  const out = document.getElementById('result');
  if (!date || !meeting || !race) { out.textContent = 'Fill in date, meeting and race.'; return; }
  out.textContent = 'Working…';
  const r = await fetch(endpoint, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ date, meeting, race }),
  });
  const text = await r.text();
  try { out.textContent = JSON.stringify(JSON.parse(text), null, 2); }
  catch { out.textContent = r.status + ': ' + text; }
  out.className = '';
  loadAll();
}

async function loadAll() {
  await Promise.all([loadStats(), loadHistory()]);
  document.getElementById('last-updated').textContent = 'Updated ' + new Date().toLocaleTimeString();
}

document.getElementById('budget-badge').textContent = 'Budget ' + (document.body.dataset.budget || '?') + ' €/race';
loadAll();
setInterval(loadAll, 30000);
</script>
</body>
</html>"#;
