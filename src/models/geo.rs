use serde::{Deserialize, Serialize};

/// 辺の緯度差がゼロとなる退化した辺でのゼロ除算を防ぐ微小量
const EDGE_EPSILON: f64 = 1e-12;

/// 地理座標（十進度の緯度・経度）を表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64, // deg
    pub lng: f64, // deg
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// 両座標が有限値かどうかを判定
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// 頂点列の外接矩形（緯度・経度の最小・最大値）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// 地理多角形を表す構造体
///
/// 頂点列は (緯度, 経度) の順序付きリストで、末尾の頂点は先頭と暗黙に
/// 接続されます。3頂点以上を前提とします。構築後は不変です。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    vertices: Vec<GeoPoint>,
}

impl GeoPolygon {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    /// 点が多角形の内部にあるかどうかを判定
    ///
    /// 偶奇規則（even-odd rule）のレイキャスティングで判定します。
    /// 各辺について、点の緯度が辺の両端の緯度を横切り、かつ点の経度が
    /// その緯度における辺上の経度（線形補間）より西にある場合に交差を
    /// 数え、交差回数が奇数なら内部と判定します。
    ///
    /// 緯度が等しい退化した辺は分母に微小量を加えて扱うため、
    /// ゼロ除算は発生しません。座標に非有限値を含む点は常に外部と
    /// 判定されます。
    pub fn contains(&self, point: GeoPoint) -> bool {
        let x = point.lng;
        let y = point.lat;
        let n = self.vertices.len();
        if n == 0 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let xi = self.vertices[i].lng;
            let yi = self.vertices[i].lat;
            let xj = self.vertices[j].lng;
            let yj = self.vertices[j].lat;

            let crosses = ((yi > y) != (yj > y))
                && x < (xj - xi) * (y - yi) / (yj - yi + EDGE_EPSILON) + xi;
            if crosses {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// 全頂点を含む外接矩形を計算
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for v in &self.vertices {
            bbox.min_lat = bbox.min_lat.min(v.lat);
            bbox.max_lat = bbox.max_lat.max(v.lat);
            bbox.min_lng = bbox.min_lng.min(v.lng);
            bbox.max_lng = bbox.max_lng.max(v.lng);
        }
        bbox
    }

    /// 頂点座標の算術平均を計算
    ///
    /// 凹多角形では内部にあるとは限りません。
    pub fn centroid(&self) -> GeoPoint {
        let n = self.vertices.len() as f64;
        let lat_sum: f64 = self.vertices.iter().map(|v| v.lat).sum();
        let lng_sum: f64 = self.vertices.iter().map(|v| v.lng).sum();
        GeoPoint::new(lat_sum / n, lng_sum / n)
    }
}
