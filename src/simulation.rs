//! # Simulation モジュール
//!
//! ロボット群シミュレーションの中核となるエンジンを提供します。
//!
//! このモジュールは、閉じ込め多角形の内部に配置されたロボット位置の
//! 順序付き集合を保持し、読み取り・一括ステップ・再配置の各操作を
//! 提供します。ロボットの同一性は列内のインデックスのみで、再配置は
//! 全要素を置き換えます。
//!
//! ## 主要機能
//!
//! - **再配置（respawn）**: 棄却サンプリングによる領域内への一様配置
//! - **一括ステップ（step_all)**: 全ロボットの独立なランダム歩行
//! - **境界補正**: 領域外へ出るステップの反転リトライと据え置き
//!
//! ## 不変条件
//!
//! 成功したステップの後、各ロボット位置は閉じ込め多角形の内部に
//! あります。サンプリングのフォールバック経路で生じた領域外位置は
//! 強制的に矯正せず、以降のステップで新たな違反を作らないことのみを
//! 保証します。
//!
//! ## 並行性
//!
//! エンジン自体は同期資源です。HTTPハンドラとスケジューラの両方から
//! 変更されるため、共有時は [`SharedFleet`] の単一ロックで直列化し、
//! ロック保持中に待機点を挟まないでください。

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::models::{GeoPoint, GeoPolygon, motion};

/// 閉じ込め多角形の頂点（緯度, 経度）
///
/// ロサンゼルス中心部の固定領域。構成で変更しない設計です。
pub const CONFINEMENT_VERTICES: [[f64; 2]; 4] = [
    [34.055, -118.275],
    [34.055, -118.225],
    [34.02, -118.225],
    [34.02, -118.275],
];

/// 既定の閉じ込め多角形を構築
pub fn confinement_polygon() -> GeoPolygon {
    GeoPolygon::new(
        CONFINEMENT_VERTICES
            .iter()
            .map(|v| GeoPoint::new(v[0], v[1]))
            .collect(),
    )
}

/// ハンドラとスケジューラで共有するエンジンのハンドル
pub type SharedFleet = Arc<Mutex<FleetEngine>>;

/// ロボット群の位置を保持・更新するエンジン
pub struct FleetEngine {
    region: GeoPolygon,
    robots: Vec<GeoPoint>,
    step_count: u64,
}

impl FleetEngine {
    /// エンジンを作成し、初期台数を領域内に配置
    pub fn new(region: GeoPolygon, initial_count: usize) -> Self {
        let mut engine = Self {
            region,
            robots: Vec::new(),
            step_count: 0,
        };
        engine.respawn(initial_count);
        info!("ロボット群エンジンを初期化しました: {}台", engine.len());
        engine
    }

    /// 共有ハンドル付きでエンジンを作成
    pub fn shared(region: GeoPolygon, initial_count: usize) -> SharedFleet {
        Arc::new(Mutex::new(Self::new(region, initial_count)))
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    pub fn region(&self) -> &GeoPolygon {
        &self.region
    }

    /// 累計ステップ実行回数
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// 現在位置のスナップショットを取得
    ///
    /// 返り値は呼び出し時点の複製で、以降の変更の影響を受けません。
    pub fn robots(&self) -> Vec<GeoPoint> {
        self.robots.clone()
    }

    /// 全ロボットを破棄し、指定台数を領域内に再配置
    ///
    /// 既存のインデックス（同一性）は全て失われます。`count` が 0 の
    /// 場合は空の群になります。
    pub fn respawn(&mut self, count: usize) -> Vec<GeoPoint> {
        self.robots = (0..count).map(|_| motion::sample_point(&self.region)).collect();
        debug!("ロボットを再配置しました: {}台", count);
        self.robots.clone()
    }

    /// 全ロボットを指定距離だけ独立にステップ
    ///
    /// 各ロボットについてランダム方位の候補位置を計算し、領域外なら
    /// 元の位置から距離を反転してもう一度だけ試します（方位は新たな
    /// 乱数です）。それも領域外なら今回のステップでは位置を据え置き
    /// ます。ロボット間の協調や衝突回避はありません。
    ///
    /// 非有限の `meters` では候補が内部判定に合格しないため、全位置が
    /// 据え置かれます。NaN座標が混入することはありません。
    pub fn step_all(&mut self, meters: f64) -> Vec<GeoPoint> {
        let region = &self.region;
        let stepped: Vec<GeoPoint> = self
            .robots
            .iter()
            .map(|&pos| {
                let next = motion::step_by_meters(pos, meters);
                if region.contains(next) {
                    return next;
                }
                let back = motion::step_by_meters(pos, -meters);
                if region.contains(back) { back } else { pos }
            })
            .collect();
        self.robots = stepped;
        self.step_count += 1;
        self.robots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> GeoPolygon {
        GeoPolygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
            GeoPoint::new(1.0, 0.0),
        ])
    }

    #[test]
    fn test_respawn_counts() {
        let mut engine = FleetEngine::new(unit_square(), 5);
        assert_eq!(engine.len(), 5);
        for p in engine.robots() {
            assert!(engine.region().contains(p), "spawned outside: {p:?}");
        }

        engine.respawn(0);
        assert!(engine.is_empty());

        let robots = engine.respawn(7);
        assert_eq!(robots.len(), 7);
        assert_eq!(engine.len(), 7);
    }

    #[test]
    fn test_step_all_preserves_len_and_containment() {
        let mut engine = FleetEngine::new(unit_square(), 10);
        for _ in 0..50 {
            let robots = engine.step_all(5000.0);
            assert_eq!(robots.len(), 10);
            for p in robots {
                assert!(engine.region().contains(p), "stepped outside: {p:?}");
            }
        }
        assert_eq!(engine.step_count(), 50);
    }

    #[test]
    fn test_step_all_zero_meters_is_noop() {
        let mut engine = FleetEngine::new(unit_square(), 5);
        let before = engine.robots();
        let after = engine.step_all(0.0);
        assert_eq!(before, after);
    }

    #[test]
    fn test_step_all_leaves_position_on_double_failure() {
        // 1度四方の領域に対して巨大距離を指定すると、正負どちらの
        // 候補も必ず領域外となり、位置は据え置かれる
        let mut engine = FleetEngine::new(unit_square(), 5);
        let before = engine.robots();
        let after = engine.step_all(1.0e9);
        assert_eq!(before, after);
    }

    #[test]
    fn test_step_all_rejects_non_finite_meters() {
        let mut engine = FleetEngine::new(unit_square(), 5);
        let before = engine.robots();
        for &meters in &[f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let after = engine.step_all(meters);
            assert_eq!(before, after);
            for p in &after {
                assert!(p.is_finite());
            }
        }
    }

    #[test]
    fn test_confinement_polygon_spawns_inside() {
        let mut engine = FleetEngine::new(confinement_polygon(), 20);
        assert_eq!(engine.len(), 20);
        for p in engine.step_all(1.0) {
            assert!(engine.region().contains(p));
        }
    }
}
