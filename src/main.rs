use {
    anyhow::{Context, Result, bail},
    clap::Parser,
    session_echo::{
        ANALYSIS, CalendarWindowProvider, Cli, MemoryStore, Pipeline, RunMode, SnapshotStorage,
        SqliteStorage,
        engine::{IntegrityIssue, repair_resolution_timing, store_summary, verify_store},
        utils::now_timestamp_ms,
    },
    std::{panic, path::Path},
    tabled::{Table, settings::Style},
};

#[tokio::main]
async fn main() -> Result<()> {
    panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("CRITICAL PANIC:\n{}\nStack Trace:\n{}", info, backtrace);
    }));

    let (global_level, my_code_level) = if cfg!(debug_assertions) {
        (log::LevelFilter::Warn, log::LevelFilter::Info)
    } else {
        (log::LevelFilter::Error, log::LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::new();

    builder
        .filter(None, global_level)
        .filter(Some("session_echo"), my_code_level)
        .init();

    let args = Cli::parse();
    let pair = args.pair();
    let db_path = args.db_path();

    if let Some(dir) = Path::new(&db_path).parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Creating {}", dir.display()))?;
    }

    let storage = SqliteStorage::new(&db_path).await?;
    storage.initialize().await?;
    let store = storage.load_snapshot(&pair.symbols()).await?;
    log::info!(
        "Loaded {} ({}): {} sessions, {} events",
        db_path,
        args.granularity,
        store.all_sessions().count(),
        store.all_events().count()
    );

    match args.command {
        session_echo::Command::Run { full } => {
            let mode = if full { RunMode::Full } else { RunMode::Incremental };
            let granularity = args.granularity;
            let run_pair = pair.clone();

            // The engine is synchronous and CPU bound.
            let (store, report) = tokio::task::spawn_blocking(move || {
                let mut store = store;
                let windows = CalendarWindowProvider::default();
                let pipeline = Pipeline::new(&run_pair, granularity, &windows, &ANALYSIS);
                let report = pipeline.run(&mut store, mode, now_timestamp_ms());
                (store, report)
            })
            .await
            .context("Pipeline task panicked")?;

            storage.commit(&store).await?;
            println!("{}", report);
            for failure in &report.failures {
                println!("  failed {}: {}", failure.unit, failure.error);
            }
            println!("{}", store_summary(&store));
        }
        session_echo::Command::Repair { dry_run } => {
            let mut store: MemoryStore = store;
            let repaired = repair_resolution_timing(&mut store, &pair, &ANALYSIS, dry_run)?;
            if !dry_run {
                storage.commit(&store).await?;
            }
            println!(
                "{} {} session(s)",
                if dry_run { "Would repair" } else { "Repaired" },
                repaired.len()
            );
        }
        session_echo::Command::Verify => {
            let issues: Vec<IntegrityIssue> = verify_store(&store, &pair.symbols(), &ANALYSIS);
            if issues.is_empty() {
                println!("✅ No integrity issues");
            } else {
                println!("{}", Table::new(&issues).with(Style::rounded()));
                bail!("{} integrity issue(s)", issues.len());
            }
        }
        session_echo::Command::Summary => {
            println!("{}", store_summary(&store));
        }
    }

    Ok(())
}
