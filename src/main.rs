mod config;
mod logging;
mod models;
mod scheduler;
mod server;
mod simulation;

use std::str::FromStr;
use std::sync::Arc;

use clap::{Arg, Command};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info};

use config::ServiceConfig;
use logging::{LogConfig, LogOutput, init_logging, verbosity_to_level};
use scheduler::AutoStepper;
use server::{AppState, build_router};
use simulation::{FleetEngine, confinement_polygon};

#[tokio::main]
async fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("robosim")
        .version("0.1.0")
        .about("ロボット群シミュレーションサービス (Robot Fleet Simulation)")
        .long_about(
            "多角形領域内に閉じ込めたロボット群のシミュレーションサービス\n\
             地図表示クライアント向けに位置取得・移動・再配置・自動ステップの\n\
             HTTP APIを提供します。",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("設定ファイル(.yaml)のパスを指定")
                .long_help(
                    "読み込む設定ファイル(.yaml)のパスを指定します。\n\
                     指定しない場合、既定値と環境変数のみで起動します。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("設定の概要のみ表示して終了"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("DEST")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 詳細, -vv: デバッグ)"),
        )
        .get_matches();

    // 設定の読み込み（ファイル + 環境変数上書き + 検証）
    let config = match ServiceConfig::load(matches.get_one::<String>("config").map(String::as_str))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("エラー: {}", e);
            std::process::exit(1);
        }
    };

    // 情報表示のみの場合
    if matches.get_flag("info") {
        config.print_summary();
        return;
    }

    // ロギングの初期化
    let output = match matches.get_one::<String>("log-output") {
        Some(raw) => match LogOutput::from_str(raw) {
            Ok(output) => output,
            Err(e) => {
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        },
        None => LogOutput::Console,
    };
    let log_config = LogConfig {
        level: verbosity_to_level(matches.get_count("verbose")),
        output,
        ..LogConfig::default()
    };
    if let Err(e) = init_logging(log_config) {
        eprintln!("エラー: ログ初期化に失敗しました: {}", e);
        std::process::exit(1);
    }

    config.print_summary();
    println!();

    // エンジンとスケジューラの構築
    let fleet = FleetEngine::shared(confinement_polygon(), config.fleet.initial_count as usize);
    let mut stepper = AutoStepper::new(Arc::clone(&fleet));

    // プロセス起動時に既定値で自動ステップを開始する
    stepper
        .start(config.fleet.move_meters, config.fleet.move_interval_ms)
        .await;

    let state = AppState {
        fleet,
        stepper: Arc::new(AsyncMutex::new(stepper)),
        defaults: config.fleet,
    };
    let app = build_router(state);

    // HTTPサーバーの起動
    let bind_addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{} にバインドできません: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    info!("ロボットサービスを起動しました: http://{}", bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("サーバーが異常終了しました: {}", e);
        std::process::exit(1);
    }
}
