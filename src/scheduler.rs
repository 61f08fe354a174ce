//! # Scheduler モジュール
//!
//! ロボット群の周期的な自動ステップを提供します。
//!
//! スケジューラは Idle（タイマーなし）と Running（周期タイマー1本）の
//! 2状態を持ちます。`start` は既存タイマーの停止を確認してから新しい
//! タイマーを張るため、同時に2本のタイマーが生きることはありません。
//! `stop` は冪等で、戻った時点以降にティックが発火しないことを保証
//! します。
//!
//! ## ティックの隔離
//!
//! 1回のティックでの失敗がスケジュール自体を止めないよう、各ティックの
//! 実行はパニック捕捉で隔離します。ロックのポイズニングも回復して
//! 次のティックを継続します。

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};
use tracing::{error, info, trace};

use crate::simulation::SharedFleet;

/// 動作中の自動ステップのパラメータ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoStepParams {
    pub meters: f64,
    pub interval_ms: u64,
}

/// キャンセル可能な周期タイマーでロボット群を自動ステップさせる
pub struct AutoStepper {
    fleet: SharedFleet,
    task: Option<JoinHandle<()>>,
    params: Option<AutoStepParams>,
}

impl AutoStepper {
    pub fn new(fleet: SharedFleet) -> Self {
        Self {
            fleet,
            task: None,
            params: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// 動作中のパラメータ（Idle状態では None）
    pub fn current_params(&self) -> Option<AutoStepParams> {
        self.params
    }

    /// 周期タイマーを張り、`interval_ms` ごとに一括ステップを実行
    ///
    /// 動作中に呼ばれた場合は既存タイマーを停止してから置き換えます
    /// （スタックせず常に1本）。最初のティックは1周期後に発火します。
    /// `interval_ms` は正の値を前提とします。
    pub async fn start(&mut self, meters: f64, interval_ms: u64) {
        self.cancel_current().await;

        let fleet = Arc::clone(&self.fleet);
        let period = Duration::from_millis(interval_ms.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                run_tick(&fleet, meters);
            }
        });

        self.task = Some(handle);
        self.params = Some(AutoStepParams { meters, interval_ms });
        info!("自動ステップを開始しました: {}m / {}ms間隔", meters, interval_ms);
    }

    /// タイマーを停止して Idle 状態へ遷移
    ///
    /// 戻り値は停止前に動作中だったかどうか。Idle状態での呼び出しは
    /// 何もしません。タスクの終了を待ってから戻るため、戻った後に
    /// ティックが発火することはありません。
    pub async fn stop(&mut self) -> bool {
        let was_running = self.task.is_some();
        self.cancel_current().await;
        self.params = None;
        if was_running {
            info!("自動ステップを停止しました");
        }
        was_running
    }

    async fn cancel_current(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
            // 停止の確認: abort後のタスク終了を待ち合わせる
            let _ = handle.await;
        }
    }
}

/// 1ティック分の一括ステップを隔離実行
fn run_tick(fleet: &SharedFleet, meters: f64) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut engine = fleet
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        engine.step_all(meters);
        engine.step_count()
    }));
    match result {
        Ok(count) => trace!("自動ステップ実行: {}m (累計{}回)", meters, count),
        Err(_) => error!("自動ステップ中にパニックが発生しました。スケジュールは継続します"),
    }
}
