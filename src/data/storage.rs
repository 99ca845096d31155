use {
    crate::{
        config::{DF, PERSISTENCE},
        data::{memory::MemoryStore, repository::MetadataRepository},
        domain::{
            Candle, Lifecycle, PeriodId, PoiEvent, PoiEventKey, PriceLevels, ProcessingMetadata,
            Session, Swing,
        },
    },
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    sqlx::{
        ConnectOptions, Pool, QueryBuilder, Row, Sqlite,
        sqlite::{
            SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
            SqliteSynchronous,
        },
    },
    std::{fmt::Display, str::FromStr, time::Duration},
};

/// Moves a run's working set between SQLite and a `MemoryStore`.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    /// Candles for `symbols` plus every session, event, swing and metadata row.
    async fn load_snapshot(&self, symbols: &[&str]) -> Result<MemoryStore>;
    /// Replaces all derived tables with the store's contents in one transaction.
    async fn commit(&self, store: &MemoryStore) -> Result<()>;
}

pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    pub async fn new(db_path: &str) -> Result<Self> {
        let connection_options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(60))
            .synchronous(SqliteSynchronous::Normal)
            .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .with_context(|| format!("Failed to open {}", db_path))?;

        Ok(Self { pool })
    }
}

fn parse<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow!("Bad stored value '{}': {}", value, e))
}

fn parse_opt<T>(value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    value.as_deref().map(parse).transpose()
}

fn to_usize(value: i64, column: &str) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("Negative {}: {}", column, value))
}

/// Rows per multi-value INSERT for a table with `columns` columns.
fn chunk_rows(columns: usize) -> usize {
    (PERSISTENCE.max_bind_params / columns).max(1)
}

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let label: String = row.try_get("session_name")?;
    let true_open: Option<f64> = row.try_get("true_open")?;
    let poc: Option<f64> = row.try_get("poc")?;

    Ok(Session {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        period: parse::<PeriodId>(&label)?,
        window_start: row.try_get("window_start")?,
        window_end: row.try_get("window_end")?,
        true_open_time: row.try_get("to_time")?,
        true_open_source: parse(&row.try_get::<String, _>("to_source")?)?,
        // rpp is derived, never trusted from disk.
        levels: true_open.zip(poc).map(|(to, poc)| PriceLevels::from_poc(to, poc)),
        lifecycle: Lifecycle {
            status: parse(&row.try_get::<String, _>("status")?)?,
            first_break_time: row.try_get("first_break_time")?,
            first_break_side: parse_opt(row.try_get("first_break_side")?)?,
            first_return_time: row.try_get("first_return_time")?,
            second_break_time: row.try_get("second_break_time")?,
            second_break_side: parse_opt(row.try_get("second_break_side")?)?,
            resolution_time: row.try_get("resolution_time")?,
            resolution_type: parse_opt(row.try_get("resolution_type")?)?,
        },
        expires_at: row.try_get("expires_at")?,
        last_scan_time: row.try_get("last_scan_time")?,
        needs_recompute: row.try_get("needs_recalc")?,
        last_recompute_time: row.try_get("last_recalc_time")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<PoiEvent> {
    let label: String = row.try_get("session_name")?;
    Ok(PoiEvent {
        id: row.try_get("id")?,
        key: PoiEventKey {
            primary_session_id: row.try_get("primary_session_id")?,
            secondary_session_id: row.try_get("secondary_session_id")?,
            level: parse(&row.try_get::<String, _>("poi_type")?)?,
            event_type: parse(&row.try_get::<String, _>("event_type")?)?,
        },
        period: parse(&label)?,
        trading_day: parse_opt(row.try_get("trading_day")?)?,
        primary_time: row.try_get("primary_time")?,
        secondary_time: row.try_get("secondary_time")?,
        time_delta_minutes: row.try_get("time_delta_minutes")?,
        leader: parse_opt(row.try_get("leader")?)?,
    })
}

fn swing_from_row(row: &SqliteRow) -> Result<Swing> {
    let candles_from_prior: Option<i64> = row.try_get("candles_from_prior")?;
    Ok(Swing {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        time: row.try_get("time")?,
        candle_index: to_usize(row.try_get("candle_index")?, "candle_index")?,
        price: row.try_get("price")?,
        direction: parse(&row.try_get::<String, _>("direction")?)?,
        class: u8::try_from(row.try_get::<i64, _>("class")?).context("Swing class out of range")?,
        prior_opposite_swing_id: row.try_get("prior_opposite_swing_id")?,
        points_from_prior: row.try_get("points_from_prior")?,
        candles_from_prior: candles_from_prior
            .map(|c| to_usize(c, "candles_from_prior"))
            .transpose()?,
        nearest_poi_event_id: row.try_get("nearest_poi_event_id")?,
        candles_from_poi: row.try_get("candles_from_poi")?,
        active_sessions: row.try_get("active_sessions_snapshot")?,
    })
}

fn metadata_from_row(row: &SqliteRow) -> Result<ProcessingMetadata> {
    Ok(ProcessingMetadata {
        symbol: row.try_get("symbol")?,
        process: parse(&row.try_get::<String, _>("process_type")?)?,
        last_processed_time: row.try_get("last_processed_time")?,
        records_processed: to_usize(row.try_get("records_processed")?, "records_processed")?,
        status: parse(&row.try_get::<String, _>("status")?)?,
        error_message: row.try_get("error_message")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl SnapshotStorage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS ohlc (
                symbol TEXT NOT NULL,
                time INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                PRIMARY KEY (symbol, time)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY,
                symbol TEXT NOT NULL,
                session_type TEXT NOT NULL,
                session_name TEXT NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                to_time INTEGER NOT NULL,
                to_source TEXT NOT NULL,
                true_open REAL,
                poc REAL,
                rpp REAL,
                status TEXT NOT NULL,
                first_break_time INTEGER,
                first_break_side TEXT,
                first_return_time INTEGER,
                second_break_time INTEGER,
                second_break_side TEXT,
                resolution_time INTEGER,
                resolution_type TEXT,
                expires_at INTEGER,
                last_scan_time INTEGER,
                needs_recalc INTEGER NOT NULL DEFAULT 0,
                last_recalc_time INTEGER,
                UNIQUE (symbol, session_name)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS poi_events (
                id INTEGER PRIMARY KEY,
                primary_session_id INTEGER NOT NULL,
                secondary_session_id INTEGER NOT NULL,
                session_type TEXT NOT NULL,
                session_name TEXT NOT NULL,
                trading_day TEXT,
                poi_type TEXT NOT NULL,
                event_type TEXT NOT NULL,
                primary_time INTEGER,
                secondary_time INTEGER,
                time_delta_minutes INTEGER,
                leader TEXT,
                UNIQUE (primary_session_id, secondary_session_id, poi_type, event_type)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS swings (
                id INTEGER PRIMARY KEY,
                symbol TEXT NOT NULL,
                time INTEGER NOT NULL,
                candle_index INTEGER NOT NULL,
                price REAL NOT NULL,
                direction TEXT NOT NULL,
                class INTEGER NOT NULL,
                prior_opposite_swing_id INTEGER,
                points_from_prior REAL,
                candles_from_prior INTEGER,
                nearest_poi_event_id INTEGER,
                candles_from_poi INTEGER,
                active_sessions_snapshot TEXT
            );
            "#,
            "CREATE INDEX IF NOT EXISTS idx_swings_symbol_time ON swings (symbol, time);",
            r#"
            CREATE TABLE IF NOT EXISTS processing_metadata (
                symbol TEXT NOT NULL,
                process_type TEXT NOT NULL,
                last_processed_time INTEGER,
                records_processed INTEGER NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, process_type)
            );
            "#,
        ];

        for sql in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .context("Failed to create schema")?;
        }

        Ok(())
    }

    async fn load_snapshot(&self, symbols: &[&str]) -> Result<MemoryStore> {
        let mut store = MemoryStore::new();

        for &symbol in symbols {
            let rows = sqlx::query(
                r#"
                SELECT time, open, high, low, close
                FROM ohlc
                WHERE symbol = ?
                ORDER BY time ASC
                "#,
            )
            .bind(symbol)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to load candles for {}", symbol))?;

            let candles = rows
                .iter()
                .map(|row| {
                    Ok(Candle::new(
                        row.try_get("time")?,
                        row.try_get("open")?,
                        row.try_get("high")?,
                        row.try_get("low")?,
                        row.try_get("close")?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;

            if DF.log_storage {
                log::info!("Loaded {} candles for {}", candles.len(), symbol);
            }
            store.load_candles(symbol, candles);
        }

        let rows = sqlx::query("SELECT * FROM sessions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load sessions")?;
        for row in &rows {
            store.restore_session(session_from_row(row)?);
        }

        let rows = sqlx::query("SELECT * FROM poi_events ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load poi_events")?;
        for row in &rows {
            store.restore_event(event_from_row(row)?);
        }

        let rows = sqlx::query("SELECT * FROM swings ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load swings")?;
        for row in &rows {
            store.restore_swing(swing_from_row(row)?);
        }

        let rows = sqlx::query("SELECT * FROM processing_metadata")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load processing_metadata")?;
        for row in &rows {
            store.put_metadata(metadata_from_row(row)?);
        }

        Ok(store)
    }

    async fn commit(&self, store: &MemoryStore) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin commit")?;

        for table in ["poi_events", "swings", "sessions", "processing_metadata"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to clear {}", table))?;
        }

        let sessions: Vec<&Session> = store.all_sessions().collect();
        for chunk in sessions.chunks(chunk_rows(23)) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO sessions (id, symbol, session_type, session_name, window_start, window_end, \
                 to_time, to_source, true_open, poc, rpp, status, first_break_time, first_break_side, \
                 first_return_time, second_break_time, second_break_side, resolution_time, \
                 resolution_type, expires_at, last_scan_time, needs_recalc, last_recalc_time) ",
            );
            qb.push_values(chunk, |mut b, s| {
                let lc = &s.lifecycle;
                b.push_bind(s.id)
                    .push_bind(s.symbol.clone())
                    .push_bind(s.kind().to_string())
                    .push_bind(s.period.label())
                    .push_bind(s.window_start)
                    .push_bind(s.window_end)
                    .push_bind(s.true_open_time)
                    .push_bind(s.true_open_source.to_string())
                    .push_bind(s.levels.map(|l| l.true_open))
                    .push_bind(s.levels.map(|l| l.poc))
                    .push_bind(s.levels.map(|l| l.rpp))
                    .push_bind(lc.status.to_string())
                    .push_bind(lc.first_break_time)
                    .push_bind(lc.first_break_side.map(|v| v.to_string()))
                    .push_bind(lc.first_return_time)
                    .push_bind(lc.second_break_time)
                    .push_bind(lc.second_break_side.map(|v| v.to_string()))
                    .push_bind(lc.resolution_time)
                    .push_bind(lc.resolution_type.map(|v| v.to_string()))
                    .push_bind(s.expires_at)
                    .push_bind(s.last_scan_time)
                    .push_bind(s.needs_recompute)
                    .push_bind(s.last_recompute_time);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("Failed to write sessions")?;
        }

        let events: Vec<&PoiEvent> = store.all_events().collect();
        for chunk in events.chunks(chunk_rows(12)) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO poi_events (id, primary_session_id, secondary_session_id, session_type, \
                 session_name, trading_day, poi_type, event_type, primary_time, secondary_time, \
                 time_delta_minutes, leader) ",
            );
            qb.push_values(chunk, |mut b, e| {
                b.push_bind(e.id)
                    .push_bind(e.key.primary_session_id)
                    .push_bind(e.key.secondary_session_id)
                    .push_bind(e.period.kind().to_string())
                    .push_bind(e.period.label())
                    .push_bind(e.trading_day.map(|d| d.format("%Y-%m-%d").to_string()))
                    .push_bind(e.key.level.to_string())
                    .push_bind(e.key.event_type.to_string())
                    .push_bind(e.primary_time)
                    .push_bind(e.secondary_time)
                    .push_bind(e.time_delta_minutes)
                    .push_bind(e.leader.map(|l| l.to_string()));
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("Failed to write poi_events")?;
        }

        let swings: Vec<&Swing> = store.all_swings().collect();
        for chunk in swings.chunks(chunk_rows(13)) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO swings (id, symbol, time, candle_index, price, direction, class, \
                 prior_opposite_swing_id, points_from_prior, candles_from_prior, \
                 nearest_poi_event_id, candles_from_poi, active_sessions_snapshot) ",
            );
            qb.push_values(chunk, |mut b, s| {
                b.push_bind(s.id)
                    .push_bind(s.symbol.clone())
                    .push_bind(s.time)
                    .push_bind(s.candle_index as i64)
                    .push_bind(s.price)
                    .push_bind(s.direction.to_string())
                    .push_bind(s.class as i64)
                    .push_bind(s.prior_opposite_swing_id)
                    .push_bind(s.points_from_prior)
                    .push_bind(s.candles_from_prior.map(|c| c as i64))
                    .push_bind(s.nearest_poi_event_id)
                    .push_bind(s.candles_from_poi)
                    .push_bind(s.active_sessions.clone());
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .context("Failed to write swings")?;
        }

        for m in store.all_metadata() {
            sqlx::query(
                r#"
                INSERT INTO processing_metadata
                    (symbol, process_type, last_processed_time, records_processed, status, error_message, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&m.symbol)
            .bind(m.process.to_string())
            .bind(m.last_processed_time)
            .bind(m.records_processed as i64)
            .bind(m.status.to_string())
            .bind(&m.error_message)
            .bind(m.updated_at)
            .execute(&mut *tx)
            .await
            .context("Failed to write processing_metadata")?;
        }

        tx.commit().await.context("Failed to commit run")?;

        if DF.log_storage {
            log::info!(
                "💾 Committed {} sessions, {} events, {} swings",
                sessions.len(),
                events.len(),
                swings.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::repository::{
            CandleRepository, PoiEventRepository, SessionRepository, SwingRepository,
        },
        domain::{
            Direction, EventType, Level, NewSession, NewSwing, SessionStatus, SessionWindow,
            TrueOpenSource,
        },
    };

    async fn seed_candles(storage: &SqliteStorage, symbol: &str, candles: &[Candle]) -> Result<()> {
        let mut query_builder =
            QueryBuilder::new("INSERT INTO ohlc (symbol, time, open, high, low, close) ");
        query_builder.push_values(candles, |mut b, c| {
            b.push_bind(symbol)
                .push_bind(c.timestamp_ms)
                .push_bind(c.open_price)
                .push_bind(c.high_price)
                .push_bind(c.low_price)
                .push_bind(c.close_price);
        });
        query_builder.build().execute(&storage.pool).await?;
        Ok(())
    }

    fn temp_db(name: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "session_echo_{}_{}.sqlite",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn snapshot_survives_a_commit_and_reload() -> Result<()> {
        let storage = SqliteStorage::new(&temp_db("roundtrip")).await?;
        storage.initialize().await?;

        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle::new(i * 60_000, 100.0, 101.0, 99.0, 100.5))
            .collect();
        seed_candles(&storage, "ES", &candles).await?;

        let mut store = storage.load_snapshot(&["ES"]).await?;
        assert_eq!(store.all_candles("ES").len(), 5);

        let id = store.insert_session(NewSession {
            symbol: "ES".into(),
            period: PeriodId::Year(2024),
            window: SessionWindow {
                window_start: 0,
                window_end: 120_000,
                true_open_time: 180_000,
                true_open_source: TrueOpenSource::Open,
                expires_at: None,
            },
        })?;
        store.update_range(id, Some(PriceLevels::from_poc(100.0, 101.0)))?;
        let key = PoiEventKey {
            primary_session_id: id,
            secondary_session_id: id,
            level: Level::Poc,
            event_type: EventType::Break,
        };
        let mut event = PoiEvent::pending(key, PeriodId::Year(2024));
        event.primary_time = Some(240_000);
        store.upsert_event(event);
        store.insert_swings(
            "ES",
            vec![NewSwing {
                time: 60_000,
                candle_index: 1,
                price: 101.0,
                direction: Direction::High,
                class: 2,
                prior_position: None,
                points_from_prior: None,
                candles_from_prior: None,
                nearest_poi_event_id: None,
                candles_from_poi: None,
                active_sessions: Some("[]".into()),
            }],
        );

        storage.commit(&store).await?;
        let reloaded = storage.load_snapshot(&["ES"]).await?;

        let session = reloaded.session(id).expect("session persisted");
        assert_eq!(session.period, PeriodId::Year(2024));
        assert_eq!(session.status(), SessionStatus::Unbroken);
        assert_eq!(session.levels.map(|l| l.rpp), Some(99.0));
        assert_eq!(reloaded.find_event(&key).and_then(|e| e.primary_time), Some(240_000));
        assert_eq!(reloaded.swings_for_symbol("ES")[0].class, 2);
        Ok(())
    }
}
