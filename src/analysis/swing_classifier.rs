//! Hierarchical swing classification over one instrument's candle series.
//!
//! Works on an arena of `SwingPoint`s in time order. `prior` is a position in
//! that arena, never a database id; ids are resolved when the batch is stored.

use {
    crate::{
        config::SwingPolicy,
        domain::{Candle, Direction, PoiEventId},
    },
    itertools::Itertools,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SwingPoint {
    pub candle_index: usize,
    pub time: i64,
    pub price: f64,
    pub direction: Direction,
    pub class: u8,
    /// Position of the prior opposite swing movement is measured from.
    pub prior: Option<usize>,
    pub points_from_prior: Option<f64>,
    pub candles_from_prior: Option<usize>,
}

pub struct SwingClassifier;

impl SwingClassifier {
    pub const MAX_CLASS: u8 = 6;

    pub fn classify(candles: &[Candle], policy: &SwingPolicy) -> Vec<SwingPoint> {
        let mut points = Self::detect_pivots(candles);
        if policy.dedupe_adjacent {
            points = Self::dedupe_adjacent(points);
        }
        Self::promote(&mut points);
        Self::measure_movement(&mut points, policy.movement_class_threshold);
        points
    }

    /// Class-1 pivots: strictly beyond both neighbours. Boundary candles never
    /// qualify. A candle that is both a pivot high and a pivot low is recorded
    /// as a high.
    pub fn detect_pivots(candles: &[Candle]) -> Vec<SwingPoint> {
        candles
            .iter()
            .enumerate()
            .tuple_windows()
            .filter_map(|((_, prev), (i, c), (_, next))| {
                let direction = if c.high_price > prev.high_price && c.high_price > next.high_price {
                    Direction::High
                } else if c.low_price < prev.low_price && c.low_price < next.low_price {
                    Direction::Low
                } else {
                    return None;
                };
                let price = match direction {
                    Direction::High => c.high_price,
                    Direction::Low => c.low_price,
                };
                Some(SwingPoint {
                    candle_index: i,
                    time: c.timestamp_ms,
                    price,
                    direction,
                    class: 1,
                    prior: None,
                    points_from_prior: None,
                    candles_from_prior: None,
                })
            })
            .collect()
    }

    /// Drops a swing when the swing right before it has the same direction and
    /// price. Runs of flat pivots collapse onto their earliest member.
    pub fn dedupe_adjacent(points: Vec<SwingPoint>) -> Vec<SwingPoint> {
        points
            .into_iter()
            .coalesce(|kept, next| {
                if kept.direction == next.direction && kept.price == next.price {
                    Ok(kept)
                } else {
                    Err((kept, next))
                }
            })
            .collect()
    }

    /// Promotion passes k -> k+1 for k = 1..5, highs and lows independently.
    /// Only interior members of the class-k list that are strictly beyond both
    /// class-k neighbours move up.
    pub fn promote(points: &mut [SwingPoint]) {
        for direction in [Direction::High, Direction::Low] {
            for class in 1..Self::MAX_CLASS {
                let members = points
                    .iter()
                    .positions(|p| p.direction == direction && p.class == class)
                    .collect_vec();

                let promoted = members
                    .iter()
                    .tuple_windows()
                    .filter(|&(&l, &m, &r)| {
                        Self::more_extreme(&points[m], &points[l])
                            && Self::more_extreme(&points[m], &points[r])
                    })
                    .map(|(_, &m, _)| m)
                    .collect_vec();

                if promoted.is_empty() {
                    break;
                }
                for m in promoted {
                    points[m].class = class + 1;
                }
            }
        }
    }

    fn more_extreme(a: &SwingPoint, b: &SwingPoint) -> bool {
        match a.direction {
            Direction::High => a.price > b.price,
            Direction::Low => a.price < b.price,
        }
    }

    /// Links every swing to the nearest earlier opposite swing. Swings below
    /// `threshold` accept any class; the rest skip anything below `threshold`.
    pub fn measure_movement(points: &mut [SwingPoint], threshold: u8) {
        // Latest position seen per direction: any class, and at/above threshold.
        let mut last_any: [Option<usize>; 2] = [None, None];
        let mut last_major: [Option<usize>; 2] = [None, None];
        let slot = |d: Direction| match d {
            Direction::High => 0,
            Direction::Low => 1,
        };

        for i in 0..points.len() {
            let opposite = slot(points[i].direction.opposite());
            let prior = if points[i].class < threshold {
                last_any[opposite]
            } else {
                last_major[opposite]
            };

            if let Some(j) = prior {
                points[i].prior = Some(j);
                points[i].points_from_prior = Some((points[i].price - points[j].price).abs());
                points[i].candles_from_prior =
                    Some(points[i].candle_index - points[j].candle_index);
            }

            let own = slot(points[i].direction);
            last_any[own] = Some(i);
            if points[i].class >= threshold {
                last_major[own] = Some(i);
            }
        }
    }

    /// Latest event at or before `time`. `events` must be sorted by time.
    pub fn nearest_event(events: &[(i64, PoiEventId)], time: i64) -> Option<(i64, PoiEventId)> {
        let idx = events.partition_point(|&(t, _)| t <= time);
        idx.checked_sub(1).map(|i| events[i])
    }
}
