//! Read-only integrity checks over a store.

use {
    crate::{
        analysis::EchoChamber,
        config::AnalysisConfig,
        data::Store,
        domain::{Direction, Lifecycle, SessionStatus, Swing, SwingId},
    },
    itertools::Itertools,
    std::{collections::HashMap, fmt},
    tabled::Tabled,
};

#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct IntegrityIssue {
    #[tabled(rename = "Subject")]
    pub subject: String,
    #[tabled(rename = "Problem")]
    pub problem: String,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.problem)
    }
}

const RPP_EPSILON: f64 = 1e-9;

pub fn verify_store<S: Store>(store: &S, symbols: &[&str], config: &AnalysisConfig) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    for symbol in symbols {
        check_sessions(store, symbol, &mut issues);
        check_swings(&store.swings_for_symbol(symbol), symbol, &mut issues);
    }
    check_events(store, config, &mut issues);
    issues
}

fn check_sessions<S: Store>(store: &S, symbol: &str, issues: &mut Vec<IntegrityIssue>) {
    for s in store.sessions_for_symbol(symbol) {
        let subject = format!("{} {}", symbol, s.period);
        if let Some(levels) = s.levels {
            let mirror = 2.0 * levels.true_open - levels.poc;
            if (levels.rpp - mirror).abs() > RPP_EPSILON {
                issues.push(IntegrityIssue {
                    subject: subject.clone(),
                    problem: format!("RPP {} is not the mirror {} of PoC", levels.rpp, mirror),
                });
            }
        } else if s.status() != SessionStatus::Unbroken {
            issues.push(IntegrityIssue {
                subject: subject.clone(),
                problem: "lifecycle progressed without a range".to_string(),
            });
        }
        for problem in lifecycle_problems(&s.lifecycle) {
            issues.push(IntegrityIssue {
                subject: subject.clone(),
                problem,
            });
        }
    }
}

/// Timestamps must be strictly increasing in transition order, and the status
/// must be backed by the timestamps it implies.
pub fn lifecycle_problems(lc: &Lifecycle) -> Vec<String> {
    let mut problems = Vec::new();
    let ordered = [
        ("first break", lc.first_break_time),
        ("first return", lc.first_return_time),
        ("second break", lc.second_break_time),
        ("resolution", lc.resolution_time),
    ];
    for ((a_name, a), (b_name, b)) in ordered
        .iter()
        .filter_map(|(name, t)| t.map(|t| (*name, t)))
        .tuple_windows()
    {
        if b <= a {
            problems.push(format!("{} at {} is not after {} at {}", b_name, b, a_name, a));
        }
    }

    let required: Vec<(&str, Option<i64>)> = match lc.status {
        SessionStatus::Unbroken => Vec::new(),
        SessionStatus::Break => vec![("first break", lc.first_break_time)],
        SessionStatus::Return => vec![
            ("first break", lc.first_break_time),
            ("first return", lc.first_return_time),
        ],
        SessionStatus::Resolved => vec![
            ("first break", lc.first_break_time),
            ("first return", lc.first_return_time),
            ("second break", lc.second_break_time),
            ("resolution", lc.resolution_time),
        ],
    };
    for (name, t) in required {
        if t.is_none() {
            problems.push(format!("status {} without {} time", lc.status, name));
        }
    }
    problems
}

/// Class pyramid and backward-only prior links.
fn check_swings(swings: &[&Swing], symbol: &str, issues: &mut Vec<IntegrityIssue>) {
    let by_id: HashMap<SwingId, &Swing> = swings.iter().map(|s| (s.id, *s)).collect();

    for s in swings {
        let Some(prior_id) = s.prior_opposite_swing_id else {
            continue;
        };
        match by_id.get(&prior_id) {
            Some(prior) if prior.time >= s.time => issues.push(IntegrityIssue {
                subject: format!("{} swing {}", symbol, s.id),
                problem: format!("prior swing {} is not earlier", prior_id),
            }),
            Some(prior) if prior.direction == s.direction => issues.push(IntegrityIssue {
                subject: format!("{} swing {}", symbol, s.id),
                problem: format!("prior swing {} has the same direction", prior_id),
            }),
            None => issues.push(IntegrityIssue {
                subject: format!("{} swing {}", symbol, s.id),
                problem: format!("prior swing {} does not exist", prior_id),
            }),
            _ => {}
        }
    }

    for direction in [Direction::High, Direction::Low] {
        let counts = swings
            .iter()
            .filter(|s| s.direction == direction)
            .counts_by(|s| s.class);
        let at = |k: u8| counts.get(&k).copied().unwrap_or(0);
        for k in 2..=6u8 {
            if at(k) > at(k - 1) {
                issues.push(IntegrityIssue {
                    subject: format!("{} {} swings", symbol, direction),
                    problem: format!(
                        "{} swings at class {} but only {} at class {}",
                        at(k),
                        k,
                        at(k - 1),
                        k - 1
                    ),
                });
            }
        }
    }
}

/// Stored lead/lag must match what the two touch times imply.
fn check_events<S: Store>(store: &S, config: &AnalysisConfig, issues: &mut Vec<IntegrityIssue>) {
    for e in store.events() {
        let expected = EchoChamber::measure(e.primary_time, e.secondary_time, config.simultaneous_threshold_ms);
        let stored = e.time_delta_minutes.zip(e.leader);
        if expected != stored {
            issues.push(IntegrityIssue {
                subject: format!("event {} ({} {} {})", e.id, e.period, e.key.level, e.key.event_type),
                problem: format!("stored lead/lag {:?}, expected {:?}", stored, expected),
            });
        }
        if e.primary_time.is_none() && e.secondary_time.is_none() {
            issues.push(IntegrityIssue {
                subject: format!("event {}", e.id),
                problem: "no touch recorded on either side".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    #[test]
    fn out_of_order_lifecycle_is_reported() {
        let lc = Lifecycle {
            status: SessionStatus::Resolved,
            first_break_time: Some(10),
            first_break_side: Some(Side::Poc),
            first_return_time: Some(30),
            second_break_time: Some(40),
            second_break_side: Some(Side::Poc),
            resolution_time: Some(30),
            resolution_type: None,
        };
        let problems = lifecycle_problems(&lc);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("resolution at 30"));
    }

    #[test]
    fn status_without_timestamps_is_reported() {
        let lc = Lifecycle {
            status: SessionStatus::Return,
            first_break_time: Some(10),
            ..Default::default()
        };
        assert_eq!(
            lifecycle_problems(&lc),
            vec!["status return without first return time".to_string()]
        );
        assert!(lifecycle_problems(&Lifecycle::default()).is_empty());
    }
}
