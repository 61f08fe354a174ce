//! # Server モジュール
//!
//! 地図表示クライアント向けのHTTP APIを提供します。
//!
//! ルーティング層はエンジンの薄いアダプタで、アルゴリズム的な処理は
//! 持ちません。リクエストの数値はJavaScriptクライアントの慣習に
//! 合わせて緩く解釈し、欠落・非数値・非有限・ゼロは設定の既定値に
//! 置き換えます（ハードエラーにはしません）。
//!
//! | メソッドとパス | ボディ | レスポンス |
//! |---|---|---|
//! | GET `/robots` | なし | `{"robots": [[lat, lng], ...]}` |
//! | POST `/move` | `{"meters"?}` | 更新後の `{"robots": ...}` |
//! | POST `/reset` | `{"count"?}` | 再配置後の `{"robots": ...}` |
//! | POST `/start-auto` | `{"meters"?, "intervalMs"?}` | `{"status": "started", ...}` |
//! | POST `/stop-auto` | なし | `{"status": "stopped"}` |

use std::sync::{Arc, MutexGuard};

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::cors::{Any, CorsLayer};

use crate::config::FleetConfig;
use crate::models::GeoPoint;
use crate::scheduler::AutoStepper;
use crate::simulation::{FleetEngine, SharedFleet};

/// 位置のワイヤ表現 [lat, lng]
type LatLng = [f64; 2];

/// 1回のリセットで受け付ける台数の上限
const MAX_RESET_COUNT: f64 = 10_000.0;

/// 自動ステップ間隔の上限（1日）
const MAX_INTERVAL_MS: f64 = 86_400_000.0;

/// ハンドラ間で共有されるアプリケーション状態
#[derive(Clone)]
pub struct AppState {
    pub fleet: SharedFleet,
    pub stepper: Arc<AsyncMutex<AutoStepper>>,
    pub defaults: FleetConfig,
}

/// APIルーターを構築
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/robots", get(get_robots))
        .route("/move", post(post_move))
        .route("/reset", post(post_reset))
        .route("/start-auto", post(post_start_auto))
        .route("/stop-auto", post(post_stop_auto))
        .with_state(Arc::new(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[derive(Debug, Serialize)]
struct RobotsResponse {
    robots: Vec<LatLng>,
}

#[derive(Debug, Default, Deserialize)]
struct MoveRequest {
    #[serde(default)]
    meters: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ResetRequest {
    #[serde(default)]
    count: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct StartAutoRequest {
    #[serde(default)]
    meters: Option<Value>,
    #[serde(default, rename = "intervalMs")]
    interval_ms: Option<Value>,
}

#[derive(Debug, Serialize)]
struct StartAutoResponse {
    status: &'static str,
    meters: f64,
    #[serde(rename = "intervalMs")]
    interval_ms: u64,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

async fn health() -> &'static str {
    "ok"
}

async fn get_robots(State(state): State<Arc<AppState>>) -> Json<RobotsResponse> {
    let robots = lock_fleet(&state.fleet).robots();
    Json(RobotsResponse {
        robots: to_wire(robots),
    })
}

async fn post_move(
    State(state): State<Arc<AppState>>,
    body: Option<Json<MoveRequest>>,
) -> Json<RobotsResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let meters = resolve_meters(request.meters.as_ref(), state.defaults.move_meters);
    let robots = lock_fleet(&state.fleet).step_all(meters);
    Json(RobotsResponse {
        robots: to_wire(robots),
    })
}

async fn post_reset(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ResetRequest>>,
) -> Json<RobotsResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let count = resolve_count(request.count.as_ref(), state.defaults.initial_count);
    let robots = lock_fleet(&state.fleet).respawn(count);
    Json(RobotsResponse {
        robots: to_wire(robots),
    })
}

async fn post_start_auto(
    State(state): State<Arc<AppState>>,
    body: Option<Json<StartAutoRequest>>,
) -> Json<StartAutoResponse> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let meters = resolve_meters(request.meters.as_ref(), state.defaults.move_meters);
    let interval_ms = resolve_interval(
        request.interval_ms.as_ref(),
        state.defaults.move_interval_ms,
    );

    state.stepper.lock().await.start(meters, interval_ms).await;
    Json(StartAutoResponse {
        status: "started",
        meters,
        interval_ms,
    })
}

async fn post_stop_auto(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.stepper.lock().await.stop().await;
    Json(StatusResponse { status: "stopped" })
}

fn lock_fleet(fleet: &SharedFleet) -> MutexGuard<'_, FleetEngine> {
    fleet.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_wire(robots: Vec<GeoPoint>) -> Vec<LatLng> {
    robots.into_iter().map(|p| [p.lat, p.lng]).collect()
}

/// 移動距離の解釈（有限かつ非ゼロのみ採用、符号は維持）
fn resolve_meters(input: Option<&Value>, default: f64) -> f64 {
    match input.and_then(Value::as_f64) {
        Some(m) if m.is_finite() && m != 0.0 => m,
        _ => default,
    }
}

/// 台数の解釈（正で上限以下のみ採用、小数は切り捨て）
fn resolve_count(input: Option<&Value>, default: u32) -> usize {
    match input.and_then(Value::as_f64) {
        Some(c) if c > 0.0 && c <= MAX_RESET_COUNT => c as usize,
        _ => default as usize,
    }
}

/// 間隔の解釈（1ms以上かつ上限以下のみ採用）
fn resolve_interval(input: Option<&Value>, default: u64) -> u64 {
    match input.and_then(Value::as_f64) {
        Some(i) if i >= 1.0 && i <= MAX_INTERVAL_MS => i as u64,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::confinement_polygon;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn test_app() -> (Router, AppState) {
        let fleet = FleetEngine::shared(confinement_polygon(), 3);
        let stepper = AutoStepper::new(Arc::clone(&fleet));
        let state = AppState {
            fleet,
            stepper: Arc::new(AsyncMutex::new(stepper)),
            defaults: FleetConfig::default(),
        };
        (build_router(state.clone()), state)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_get_robots_returns_pairs() {
        let (app, _state) = test_app();
        let response = app
            .oneshot(Request::builder().uri("/robots").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let robots = body["robots"].as_array().unwrap();
        assert_eq!(robots.len(), 3);
        for pair in robots {
            assert_eq!(pair.as_array().unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_move_without_body_uses_defaults() {
        let (app, _state) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/move")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["robots"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_move_coerces_invalid_meters() {
        let (app, _state) = test_app();
        let response = app
            .oneshot(post_json("/move", r#"{"meters": "bogus"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["robots"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reset_respawns_requested_count() {
        let (app, state) = test_app();
        let response = app
            .clone()
            .oneshot(post_json("/reset", r#"{"count": 7}"#))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["robots"].as_array().unwrap().len(), 7);
        assert_eq!(lock_fleet(&state.fleet).len(), 7);

        // 非正の台数は既定値に置き換えられる
        let response = app
            .oneshot(post_json("/reset", r#"{"count": -5}"#))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["robots"].as_array().unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_start_and_stop_auto() {
        let (app, state) = test_app();

        let response = app
            .clone()
            .oneshot(post_json("/start-auto", "{}"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["meters"], 1.0);
        assert_eq!(body["intervalMs"], 60_000);
        assert!(state.stepper.lock().await.is_running());

        let response = app.oneshot(post_json("/stop-auto", "")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "stopped");
        assert!(!state.stepper.lock().await.is_running());
    }

    #[test]
    fn test_resolvers() {
        let v = |s: &str| serde_json::from_str::<Value>(s).unwrap();

        assert_eq!(resolve_meters(Some(&v("2.5")), 1.0), 2.5);
        assert_eq!(resolve_meters(Some(&v("-3")), 1.0), -3.0);
        assert_eq!(resolve_meters(Some(&v("0")), 1.0), 1.0);
        assert_eq!(resolve_meters(Some(&v("\"abc\"")), 1.0), 1.0);
        assert_eq!(resolve_meters(None, 1.0), 1.0);

        assert_eq!(resolve_count(Some(&v("7")), 20), 7);
        assert_eq!(resolve_count(Some(&v("5.9")), 20), 5);
        assert_eq!(resolve_count(Some(&v("0")), 20), 20);
        assert_eq!(resolve_count(Some(&v("-1")), 20), 20);
        assert_eq!(resolve_count(Some(&v("1e300")), 20), 20);
        assert_eq!(resolve_count(None, 20), 20);

        assert_eq!(resolve_interval(Some(&v("250")), 60_000), 250);
        assert_eq!(resolve_interval(Some(&v("0")), 60_000), 60_000);
        assert_eq!(resolve_interval(Some(&v("1e300")), 60_000), 60_000);
        assert_eq!(resolve_interval(Some(&v("null")), 60_000), 60_000);
    }
}
