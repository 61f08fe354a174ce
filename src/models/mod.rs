// 基本的な地理データ型（座標・多角形・外接矩形）
pub mod geo;

// 配置サンプリングとステップ移動の計算
pub mod motion;

// 便利な re-export
pub use geo::{BoundingBox, GeoPoint, GeoPolygon};
pub use motion::{MAX_SAMPLING_TRIALS, METERS_PER_DEG_LAT, sample_point, step_by_meters};
