use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// HTTPサーバー設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

/// ロボット群の既定値設定
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct FleetConfig {
    /// 起動時と既定リセット時のロボット台数
    pub initial_count: u32,
    /// 既定の移動距離（メートル）
    pub move_meters: f64,
    /// 自動ステップの既定間隔（ミリ秒）
    pub move_interval_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            initial_count: 20,
            move_meters: 1.0,
            move_interval_ms: 60_000,
        }
    }
}

/// サービス全体の設定
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub fleet: FleetConfig,
}

impl ServiceConfig {
    /// YAMLファイルから設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        // ファイル読み込み
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

        // YAML解析
        let config: ServiceConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))?;

        Ok(config)
    }

    /// 設定を読み込み、環境変数を上書き適用して検証
    ///
    /// `path` が None の場合は既定値から開始します。環境変数は
    /// `ROBOT_COUNT`, `MOVE_METERS`, `MOVE_INTERVAL_MS`, `PORT` を
    /// 参照し、解釈できない値は警告の上で無視します。
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 環境変数による上書きを適用
    pub fn apply_env_overrides(&mut self) {
        if let Some(count) = env_value::<u32>("ROBOT_COUNT") {
            self.fleet.initial_count = count;
        }
        if let Some(meters) = env_value::<f64>("MOVE_METERS") {
            self.fleet.move_meters = meters;
        }
        if let Some(interval) = env_value::<u64>("MOVE_INTERVAL_MS") {
            self.fleet.move_interval_ms = interval;
        }
        if let Some(port) = env_value::<u16>("PORT") {
            self.server.port = port;
        }
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }
        if !self.fleet.move_meters.is_finite() || self.fleet.move_meters == 0.0 {
            return Err(ConfigError::ValidationError(
                "fleet.move_meters must be finite and non-zero".to_string(),
            ));
        }
        if self.fleet.move_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "fleet.move_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// リスナーのバインドアドレス
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 設定の概要を表示
    pub fn print_summary(&self) {
        println!("=== サービス設定 ===");
        println!("バインドアドレス: {}", self.bind_addr());
        println!();
        println!("=== ロボット群設定 ===");
        println!("初期台数: {}台", self.fleet.initial_count);
        println!("既定移動距離: {}m", self.fleet.move_meters);
        println!(
            "自動ステップ間隔: {}ms ({:.1}秒)",
            self.fleet.move_interval_ms,
            self.fleet.move_interval_ms as f64 / 1000.0
        );
    }
}

/// 環境変数を数値として解釈
///
/// 未設定なら None。設定されているが解釈できない場合は警告を出して
/// None を返します（ロギング初期化前に呼ばれるため標準エラー出力）。
fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("警告: 環境変数 {} の値 '{}' を解釈できません。無視します", name, raw);
            None
        }
    }
}

/// 設定読み込みエラー
#[derive(Debug)]
pub enum ConfigError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "設定ファイルが見つかりません: {}", path.display())
            }
            ConfigError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ConfigError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.fleet.initial_count, 20);
        assert_eq!(config.fleet.move_meters, 1.0);
        assert_eq!(config.fleet.move_interval_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "fleet:\n  initial_count: 5\n";
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.fleet.initial_count, 5);
        assert_eq!(config.fleet.move_meters, 1.0);
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.fleet.move_meters = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.fleet.move_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        // 同一プロセス内の環境変数を書き換えるため1テストにまとめる
        unsafe {
            std::env::set_var("ROBOT_COUNT", "7");
            std::env::set_var("MOVE_METERS", "2.5");
            std::env::set_var("MOVE_INTERVAL_MS", "abc");
            std::env::set_var("PORT", "5001");
        }

        let mut config = ServiceConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.fleet.initial_count, 7);
        assert_eq!(config.fleet.move_meters, 2.5);
        assert_eq!(config.fleet.move_interval_ms, 60_000);
        assert_eq!(config.server.port, 5001);

        unsafe {
            std::env::remove_var("ROBOT_COUNT");
            std::env::remove_var("MOVE_METERS");
            std::env::remove_var("MOVE_INTERVAL_MS");
            std::env::remove_var("PORT");
        }
    }

    #[test]
    fn test_from_file_missing() {
        let err = ServiceConfig::from_file("no_such_config.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
