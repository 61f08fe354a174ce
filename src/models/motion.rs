//! # Motion モジュール
//!
//! ロボットの配置と移動に関する計算を提供します。
//!
//! 配置は外接矩形を用いた棄却サンプリング、移動は一様乱数の方位角と
//! 局所平面近似（フラットアース近似）によるメートル・度変換で行います。

use rand::Rng;
use tracing::warn;

use crate::models::geo::{GeoPoint, GeoPolygon};

/// 棄却サンプリングの最大試行回数
pub const MAX_SAMPLING_TRIALS: u32 = 1000;

/// 緯度1度あたりのメートル数
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// 多角形内部の一様分布点をサンプリング
///
/// 外接矩形内で緯度・経度を一様に引き、内部判定に合格した最初の候補を
/// 返します。最大試行回数まで全て棄却された場合（面積がほぼゼロの
/// 病的な多角形でのみ起こり得ます）は頂点座標の算術平均を返します。
/// このフォールバック点は多角形内部にある保証がなく、呼び出し側は
/// それを許容する必要があります。
pub fn sample_point(polygon: &GeoPolygon) -> GeoPoint {
    let bbox = polygon.bounding_box();
    let mut rng = rand::thread_rng();

    for _ in 0..MAX_SAMPLING_TRIALS {
        let candidate = GeoPoint::new(
            rng.gen_range(bbox.min_lat..=bbox.max_lat),
            rng.gen_range(bbox.min_lng..=bbox.max_lng),
        );
        if polygon.contains(candidate) {
            return candidate;
        }
    }

    let fallback = polygon.centroid();
    warn!(
        "棄却サンプリングが{}回で収束しませんでした。頂点平均 ({:.6}, {:.6}) を返します",
        MAX_SAMPLING_TRIALS, fallback.lat, fallback.lng
    );
    fallback
}

/// 現在位置から指定距離だけランダムな方位へ移動した位置を計算
///
/// 方位角は [0, 2π) の一様乱数で、呼び出しごとに1回引きます。
/// 距離の変換は緯度方向を111,320 m/度、経度方向を
/// `111320 × cos(緯度)` m/度とする局所平面近似を用います。
/// 子午線収束は考慮しますが、経度180度の折り返しや極付近の特異点、
/// 大円曲率は扱いません。閉じ込め領域が中緯度の狭い範囲である前提です。
pub fn step_by_meters(position: GeoPoint, meters: f64) -> GeoPoint {
    let bearing = rand::thread_rng().gen_range(0.0..std::f64::consts::TAU);

    let lat_rad = position.lat.to_radians();
    let meters_per_deg_lng = METERS_PER_DEG_LAT * lat_rad.cos();

    let delta_lat = meters * bearing.cos() / METERS_PER_DEG_LAT;
    let delta_lng = meters * bearing.sin() / meters_per_deg_lng;

    GeoPoint::new(position.lat + delta_lat, position.lng + delta_lng)
}
