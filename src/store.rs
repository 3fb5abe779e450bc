// =============================================================================
// Historical-Learning Store — sqlx-backed persistence (spec §4.4, §6.3)
// =============================================================================
//
// One table, `analysis_history`, keyed by analysis id. The market snapshot,
// recommendation, and resolution are opaque JSON blobs; a handful of
// extracted columns support the filtering operations below. A single
// background task runs `purge_expired` hourly.
// =============================================================================

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{info, instrument};

use crate::error::StoreError;
use crate::records::{AnalysisRecord, LifecycleState, Resolution};
use crate::types::{Timeframe, TradingStyle};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the sqlite database at `path` and run
    /// migrations, sizing the pool `min..=max` connections.
    pub async fn connect(path: &str, min_connections: u32, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(StoreError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_history (
                id              TEXT PRIMARY KEY,
                user_id         BIGINT NOT NULL,
                symbol          TEXT NOT NULL,
                timeframe       TEXT NOT NULL,
                trading_style   TEXT NOT NULL,
                created_at      BIGINT NOT NULL,
                expires_at      BIGINT NOT NULL,
                status          TEXT NOT NULL,
                market_snapshot TEXT NOT NULL,
                recommendation  TEXT NOT NULL,
                resolution      TEXT
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_symbol ON analysis_history(user_id, symbol)")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_symbol_created_at ON analysis_history(symbol, created_at DESC)")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_expires_at ON analysis_history(expires_at)")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        info!(db_path = path, "historical-learning store migrated");
        Ok(Self { pool })
    }

    fn status_str(state: LifecycleState) -> &'static str {
        match state {
            LifecycleState::PendingTracking => "PENDING_TRACKING",
            LifecycleState::Resolved => "RESOLVED",
            LifecycleState::Expired => "EXPIRED",
        }
    }

    fn status_from_str(s: &str) -> LifecycleState {
        match s {
            "PENDING_TRACKING" => LifecycleState::PendingTracking,
            "EXPIRED" => LifecycleState::Expired,
            _ => LifecycleState::Resolved,
        }
    }

    /// Insert `record`; fails if `record.id` already exists.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn save(&self, record: &AnalysisRecord) -> Result<String, StoreError> {
        let market_snapshot = serde_json::to_string(&record.market_snapshot).map_err(|e| StoreError::Migration(e.to_string()))?;
        let recommendation = serde_json::to_string(&record.recommendation).map_err(|e| StoreError::Migration(e.to_string()))?;
        let resolution = record
            .resolution
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO analysis_history
                (id, user_id, symbol, timeframe, trading_style, created_at, expires_at, status, market_snapshot, recommendation, resolution)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id)
        .bind(&record.symbol)
        .bind(record.timeframe.as_str())
        .bind(record.trading_style.to_string())
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(Self::status_str(record.state))
        .bind(market_snapshot)
        .bind(recommendation)
        .bind(resolution)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(record.id.clone())
    }

    /// Single-shot resolution write. Fails with `StoreError::NotFound` if
    /// the record doesn't exist, and leaves an already-resolved record
    /// untouched (the caller should treat that as `AlreadyResolved`).
    #[instrument(skip(self, resolution))]
    pub async fn update_resolution(&self, id: &str, resolution: &Resolution) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT status FROM analysis_history WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let status: String = row.get("status");
        if status != "PENDING_TRACKING" {
            return Err(StoreError::AlreadyResolved(id.to_string()));
        }

        let resolution_json = serde_json::to_string(resolution).map_err(|e| StoreError::Migration(e.to_string()))?;
        let new_status = if matches!(resolution.outcome, crate::records::Outcome::Expired) {
            "EXPIRED"
        } else {
            "RESOLVED"
        };

        sqlx::query("UPDATE analysis_history SET status = ?1, resolution = ?2 WHERE id = ?3 AND status = 'PENDING_TRACKING'")
            .bind(new_status)
            .bind(resolution_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<AnalysisRecord, StoreError> {
        let market_snapshot_raw: String = row.get("market_snapshot");
        let recommendation_raw: String = row.get("recommendation");
        let resolution_raw: Option<String> = row.get("resolution");
        let timeframe_raw: String = row.get("timeframe");
        let trading_style_raw: String = row.get("trading_style");
        let status_raw: String = row.get("status");

        Ok(AnalysisRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            symbol: row.get("symbol"),
            timeframe: Timeframe::parse(&timeframe_raw).ok_or_else(|| StoreError::Migration(format!("bad timeframe {timeframe_raw}")))?,
            trading_style: match trading_style_raw.as_str() {
                "scalping" => TradingStyle::Scalping,
                _ => TradingStyle::Swing,
            },
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            market_snapshot: serde_json::from_str(&market_snapshot_raw).map_err(|e| StoreError::Migration(e.to_string()))?,
            recommendation: serde_json::from_str(&recommendation_raw).map_err(|e| StoreError::Migration(e.to_string()))?,
            resolution: resolution_raw
                .map(|r| serde_json::from_str(&r))
                .transpose()
                .map_err(|e| StoreError::Migration(e.to_string()))?,
            state: Self::status_from_str(&status_raw),
        })
    }

    /// All records currently `PENDING_TRACKING`, used to seed the tracker's
    /// active set on start-up.
    pub async fn get_open(&self) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM analysis_history WHERE status = 'PENDING_TRACKING'")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// A single record by id, used by the tracker to re-read before
    /// writing a resolution (spec §3.8 ownership rule).
    pub async fn get_by_id(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM analysis_history WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    /// Records for `(user_id, symbol)` created within the last `window_secs`.
    pub async fn symbol_history(&self, user_id: i64, symbol: &str, window_secs: i64, now: i64) -> Result<Vec<AnalysisRecord>, StoreError> {
        let since = now - window_secs;
        let rows = sqlx::query(
            "SELECT * FROM analysis_history WHERE user_id = ?1 AND symbol = ?2 AND created_at >= ?3 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Records for `user_id` across every symbol, created within the last
    /// `window_secs`. Used by the Command API's `History` operation when the
    /// caller omits a symbol filter.
    pub async fn user_history(&self, user_id: i64, window_secs: i64, now: i64) -> Result<Vec<AnalysisRecord>, StoreError> {
        let since = now - window_secs;
        let rows = sqlx::query("SELECT * FROM analysis_history WHERE user_id = ?1 AND created_at >= ?2 ORDER BY created_at DESC")
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        rows.iter().map(Self::row_to_record).collect()
    }

    /// Delete every record whose `expires_at` is before `now`.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM analysis_history WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "purged expired analysis records");
        }
        Ok(purged)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Readiness check: a trivial round-trip against the pool.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(StoreError::Database)?;
        Ok(())
    }
}

/// Spawn the background purge loop, running `purge_expired` every hour
/// until `shutdown` resolves.
pub fn spawn_purge_task(store: Store, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    if let Err(err) = store.purge_expired(now).await {
                        tracing::warn!(%err, "purge_expired failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("purge task shutting down");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::bundle::{Consensus, MultiTimeframeBundle};
    use crate::records::{
        Action, CorrelationAnalysis, FundamentalAnalysis, HistoricalAnalysis, MacroContext, PositionSizing, Recommendation, RiskLevel,
        SectorAnalysis,
    };
    use crate::classifier::AssetType;

    fn dummy_record(id_seed: i64) -> AnalysisRecord {
        let recommendation = Recommendation {
            action: Action::Buy,
            confidence: 70,
            entry: Some(100.0),
            stop_loss: Some(95.0),
            take_profit: vec![105.0, 110.0],
            expected_holding_period: "4h".into(),
            risk_level: RiskLevel::Medium,
            asset_type: AssetType::Btc,
            reasoning: "test".into(),
            key_points: vec![],
            conflicting_signals: vec![],
            warnings: vec![],
            market_sentiment: String::new(),
            technical_score: 60,
            fundamental_score: 60,
            position_sizing_recommendation: PositionSizing::default(),
            correlation_analysis: CorrelationAnalysis::default(),
            sector_analysis: SectorAnalysis::default(),
            fundamental_analysis: FundamentalAnalysis::default(),
            macro_context: MacroContext::default(),
            historical_analysis: HistoricalAnalysis::default(),
        };
        let bundle = MultiTimeframeBundle { snapshots: Default::default(), overall_consensus: Consensus::Buy, strength: 3 };
        AnalysisRecord::new(111, "BTCUSDT".into(), Timeframe::H1, TradingStyle::Swing, id_seed, bundle, recommendation)
    }

    #[tokio::test]
    async fn save_and_get_open_round_trips() {
        let store = Store::connect(":memory:", 1, 1).await.unwrap();
        let record = dummy_record(1_700_000_000);
        store.save(&record).await.unwrap();

        let open = store.get_open().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, record.id);
    }

    #[tokio::test]
    async fn update_resolution_is_single_shot() {
        let store = Store::connect(":memory:", 1, 1).await.unwrap();
        let record = dummy_record(1_700_000_100);
        store.save(&record).await.unwrap();

        let resolution = Resolution {
            outcome: crate::records::Outcome::Win,
            exit_reason: crate::records::ExitReason::Tp1Hit,
            exit_price: 105.0,
            pnl_percent: 5.0,
            duration_secs: 3600,
            max_drawdown_percent: -1.0,
            tp_hits: vec![true, false],
            sl_hit: false,
        };

        store.update_resolution(&record.id, &resolution).await.unwrap();
        let result = store.update_resolution(&record.id, &resolution).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn purge_expired_removes_old_records() {
        let store = Store::connect(":memory:", 1, 1).await.unwrap();
        let record = dummy_record(0);
        store.save(&record).await.unwrap();

        let purged = store.purge_expired(record.expires_at + 1).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_by_id(&record.id).await.unwrap().is_none());
    }
}
