//! One-off correction for sessions whose resolution was recorded at or before
//! their first return.

use {
    crate::{
        analysis::EchoChamber,
        config::{AnalysisConfig, InstrumentPair},
        data::Store,
        domain::{EventType, Level, PeriodId, Role, SessionId, SessionStatus},
        utils::TimeUtils,
    },
    anyhow::Result,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RepairedSession {
    pub session_id: SessionId,
    pub symbol: String,
    pub period: PeriodId,
    pub first_return_time: i64,
    pub resolution_time: i64,
}

/// Moves every mis-timed session back to `Return`, clears its resolution and
/// withdraws its side of the resolution event. The scan cursor goes back to
/// the first return so the next incremental run re-derives the resolution.
/// With `dry_run` nothing is written.
pub fn repair_resolution_timing<S: Store>(
    store: &mut S,
    pair: &InstrumentPair,
    config: &AnalysisConfig,
    dry_run: bool,
) -> Result<Vec<RepairedSession>> {
    let broken: Vec<RepairedSession> = pair
        .symbols()
        .into_iter()
        .flat_map(|symbol| store.sessions_for_symbol(symbol))
        .filter_map(|s| {
            let lc = &s.lifecycle;
            match (lc.first_return_time, lc.resolution_time) {
                (Some(ret), Some(res)) if res <= ret => Some(RepairedSession {
                    session_id: s.id,
                    symbol: s.symbol.clone(),
                    period: s.period,
                    first_return_time: ret,
                    resolution_time: res,
                }),
                _ => None,
            }
        })
        .collect();

    if dry_run {
        for r in &broken {
            log::info!(
                "Would repair {} {}: resolution {} is not after return {}",
                r.symbol,
                r.period,
                r.resolution_time,
                r.first_return_time
            );
        }
        return Ok(broken);
    }

    let offset = TimeUtils::exchange_offset(config.exchange_utc_offset_hours);
    for r in &broken {
        let Some(session) = store.session(r.session_id) else {
            continue;
        };
        let mut lifecycle = session.lifecycle;
        lifecycle.status = SessionStatus::Return;
        lifecycle.resolution_time = None;
        lifecycle.resolution_type = None;
        store.update_lifecycle(r.session_id, lifecycle, Some(r.first_return_time))?;

        let Some(mut event) = store
            .events_for_session(r.session_id)
            .into_iter()
            .find(|e| e.key.level == Level::TrueOpen && e.key.event_type == EventType::Resolution)
            .cloned()
        else {
            continue;
        };
        let key = event.key;
        let role = if key.primary_session_id == r.session_id {
            Role::Primary
        } else {
            Role::Secondary
        };

        // The partner's resolution may be sound; only this side is withdrawn.
        match role {
            Role::Primary => event.primary_time = None,
            Role::Secondary => event.secondary_time = None,
        }
        if event.primary_time.is_none() && event.secondary_time.is_none() {
            store.delete_event(&key);
        } else {
            EchoChamber::refresh(
                &mut event,
                config.simultaneous_threshold_ms,
                &offset,
                config.trading_day_roll_hour,
            );
            store.upsert_event(event);
        }
        log::info!("Repaired {} {}", r.symbol, r.period);
    }

    Ok(broken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ANALYSIS,
        data::{MemoryStore, PoiEventRepository, SessionRepository},
        domain::{
            Lifecycle, NewSession, PoiEvent, PoiEventKey, ResolutionType, SessionWindow, Side,
            TrueOpenSource,
        },
    };

    fn pair_with_bad_resolution() -> (MemoryStore, SessionId, SessionId, PoiEventKey) {
        let mut store = MemoryStore::new();
        let window = SessionWindow {
            window_start: 0,
            window_end: 10,
            true_open_time: 10,
            true_open_source: TrueOpenSource::Open,
            expires_at: None,
        };
        let mut ids = Vec::new();
        for symbol in ["ES", "NQ"] {
            ids.push(
                store
                    .insert_session(NewSession {
                        symbol: symbol.into(),
                        period: PeriodId::Year(2020),
                        window,
                    })
                    .unwrap(),
            );
        }
        let bad = Lifecycle {
            status: SessionStatus::Resolved,
            first_break_time: Some(20),
            first_break_side: Some(Side::Poc),
            first_return_time: Some(40),
            second_break_time: Some(50),
            second_break_side: Some(Side::Rpp),
            resolution_time: Some(40),
            resolution_type: Some(ResolutionType::DoubleSided),
        };
        let good = Lifecycle {
            first_return_time: Some(30),
            resolution_time: Some(60),
            ..bad
        };
        store.update_lifecycle(ids[0], bad, Some(90)).unwrap();
        store.update_lifecycle(ids[1], good, Some(90)).unwrap();

        let key = PoiEventKey {
            primary_session_id: ids[0],
            secondary_session_id: ids[1],
            level: Level::TrueOpen,
            event_type: EventType::Resolution,
        };
        let mut event = PoiEvent::pending(key, PeriodId::Year(2020));
        event.primary_time = Some(40);
        event.secondary_time = Some(60);
        store.upsert_event(event);
        (store, ids[0], ids[1], key)
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let (mut store, es, _, _) = pair_with_bad_resolution();
        let found =
            repair_resolution_timing(&mut store, &InstrumentPair::default(), &ANALYSIS, true).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].session_id, es);
        assert_eq!(store.session(es).unwrap().status(), SessionStatus::Resolved);
    }

    #[test]
    fn repair_rolls_back_to_return_and_keeps_partner_time() {
        let (mut store, es, nq, key) = pair_with_bad_resolution();
        repair_resolution_timing(&mut store, &InstrumentPair::default(), &ANALYSIS, false).unwrap();

        let s = store.session(es).unwrap();
        assert_eq!(s.status(), SessionStatus::Return);
        assert!(s.lifecycle.resolution_time.is_none());
        assert_eq!(s.lifecycle.second_break_time, Some(50));
        assert_eq!(s.last_scan_time, Some(40));
        assert_eq!(store.session(nq).unwrap().status(), SessionStatus::Resolved);

        let event = store.find_event(&key).unwrap();
        assert_eq!(event.primary_time, None);
        assert_eq!(event.secondary_time, Some(60));
        assert!(event.leader.is_none());

        let again =
            repair_resolution_timing(&mut store, &InstrumentPair::default(), &ANALYSIS, false).unwrap();
        assert!(again.is_empty());
    }
}
