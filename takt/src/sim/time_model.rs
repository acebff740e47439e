//! Runtime time model samplers.
//!
//! Each declared time model becomes one sampler. Function models pre-draw a
//! batch to amortize distribution setup; scheduled models keep a cursor over
//! their schedule; distance models are pure functions of the context.

use crate::model::Location;
use crate::model::time_model::{DistanceMetric, DistributionFunction, TimeModelData};
use crate::sim::rng::EngineRng;
use hifitime::Duration;

/// Sampling context: what the caller knows about the journey, if anything.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimeContext {
    pub origin: Option<Location>,
    pub target: Option<Location>,
}

impl TimeContext {
    pub fn between(origin: Location, target: Location) -> Self {
        Self {
            origin: Some(origin),
            target: Some(target),
        }
    }
}

#[derive(Debug)]
pub(crate) enum SamplerRt {
    Function {
        dist: DistributionFunction,
        location: f64,
        scale: f64,
        batch_size: usize,
        batch: Vec<f64>,
    },
    Sample {
        samples: Vec<f64>,
    },
    Scheduled {
        schedule: Vec<f64>,
        absolute: bool,
        cyclic: bool,
        cursor: usize,
        /// Virtual elapsed time of everything handed out so far; converts
        /// absolute schedule points into relative waits.
        elapsed: f64,
    },
    Distance {
        speed: f64,
        reaction_time: f64,
        metric: DistanceMetric,
    },
}

impl SamplerRt {
    pub fn new(data: &TimeModelData) -> Self {
        match data {
            TimeModelData::Function {
                distribution_function,
                location,
                scale,
                batch_size,
                ..
            } => SamplerRt::Function {
                dist: *distribution_function,
                location: *location,
                scale: *scale,
                batch_size: (*batch_size).max(1),
                batch: Vec::new(),
            },
            TimeModelData::Sample { samples, .. } => SamplerRt::Sample {
                samples: samples.clone(),
            },
            TimeModelData::Scheduled {
                schedule,
                absolute,
                cyclic,
                ..
            } => SamplerRt::Scheduled {
                schedule: schedule.clone(),
                absolute: *absolute,
                cyclic: *cyclic,
                cursor: 0,
                elapsed: 0.0,
            },
            TimeModelData::Distance {
                speed,
                reaction_time,
                metric,
                ..
            } => SamplerRt::Distance {
                speed: *speed,
                reaction_time: *reaction_time,
                metric: *metric,
            },
        }
    }

    /// Draws the next duration. `None` only for exhausted non-cyclic
    /// schedules. Negative draws are clamped to zero.
    pub fn sample(&mut self, rng: &mut EngineRng, ctx: &TimeContext) -> Option<Duration> {
        let value = match self {
            SamplerRt::Function {
                dist,
                location,
                scale,
                batch_size,
                batch,
            } => {
                if batch.is_empty() {
                    batch.reserve(*batch_size);
                    for _ in 0..*batch_size {
                        batch.push(draw(*dist, *location, *scale, rng));
                    }
                }
                batch.pop().unwrap()
            }
            SamplerRt::Sample { samples } => {
                if samples.is_empty() {
                    return Some(Duration::ZERO);
                }
                samples[rng.index(samples.len())]
            }
            SamplerRt::Scheduled {
                schedule,
                absolute,
                cyclic,
                cursor,
                elapsed,
            } => {
                if schedule.is_empty() {
                    return None;
                }
                if *cursor >= schedule.len() {
                    if !*cyclic {
                        return None;
                    }
                    *cursor = 0;
                    // An absolute cyclic schedule repeats with a period of
                    // its last entry; shift the virtual timeline back.
                    if *absolute {
                        *elapsed -= schedule[schedule.len() - 1];
                    }
                }
                let raw = schedule[*cursor];
                *cursor += 1;
                if *absolute {
                    // `elapsed` tracks how much of the timeline was already
                    // handed out; the wait is the remaining gap.
                    let wait = raw - *elapsed;
                    *elapsed = raw;
                    wait
                } else {
                    *elapsed += raw;
                    raw
                }
            }
            SamplerRt::Distance {
                speed,
                reaction_time,
                metric,
            } => distance_duration(*speed, *reaction_time, *metric, ctx),
        };
        Some(seconds_clamped(value))
    }

    /// Deterministic expectation used by SPT policies; consumes no
    /// randomness.
    pub fn expected(&self, ctx: &TimeContext) -> Duration {
        let value = match self {
            SamplerRt::Function { location, .. } => *location,
            SamplerRt::Sample { samples } => {
                if samples.is_empty() {
                    0.0
                } else {
                    samples.iter().sum::<f64>() / samples.len() as f64
                }
            }
            SamplerRt::Scheduled { schedule, .. } => schedule.first().copied().unwrap_or(0.0),
            SamplerRt::Distance {
                speed,
                reaction_time,
                metric,
            } => distance_duration(*speed, *reaction_time, *metric, ctx),
        };
        seconds_clamped(value)
    }
}

fn draw(dist: DistributionFunction, location: f64, scale: f64, rng: &mut EngineRng) -> f64 {
    match dist {
        DistributionFunction::Constant => location,
        DistributionFunction::Exponential => rng.exponential(location),
        DistributionFunction::Normal => rng.normal(location, scale),
        DistributionFunction::Lognormal => rng.lognormal(location, scale),
    }
}

fn distance_duration(
    speed: f64,
    reaction_time: f64,
    metric: DistanceMetric,
    ctx: &TimeContext,
) -> f64 {
    let distance = match (ctx.origin, ctx.target) {
        (Some(a), Some(b)) => metric.measure(a, b),
        _ => 0.0,
    };
    if speed <= 0.0 {
        reaction_time
    } else {
        reaction_time + distance / speed
    }
}

fn seconds_clamped(value: f64) -> Duration {
    Duration::from_seconds(value.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> EngineRng {
        EngineRng::new(0)
    }

    #[test]
    fn constant_function_always_returns_location() {
        let mut sampler = SamplerRt::new(&TimeModelData::Function {
            id: "tm".into(),
            description: String::new(),
            distribution_function: DistributionFunction::Constant,
            location: 0.8,
            scale: 0.0,
            batch_size: 4,
        });
        let mut rng = rng();
        for _ in 0..10 {
            assert_eq!(
                sampler.sample(&mut rng, &TimeContext::default()),
                Some(Duration::from_seconds(0.8))
            );
        }
    }

    #[test]
    fn negative_draws_clamp_to_zero() {
        let mut sampler = SamplerRt::new(&TimeModelData::Function {
            id: "tm".into(),
            description: String::new(),
            distribution_function: DistributionFunction::Normal,
            location: -100.0,
            scale: 0.001,
            batch_size: 8,
        });
        let mut rng = rng();
        let drawn = sampler.sample(&mut rng, &TimeContext::default()).unwrap();
        assert_eq!(drawn, Duration::ZERO);
    }

    #[test]
    fn zero_distance_returns_reaction_time_exactly() {
        let mut sampler = SamplerRt::new(&TimeModelData::Distance {
            id: "tm".into(),
            description: String::new(),
            speed: 3.0,
            reaction_time: 0.15,
            metric: DistanceMetric::Manhattan,
        });
        let ctx = TimeContext::between([4.0, 2.0], [4.0, 2.0]);
        assert_eq!(
            sampler.sample(&mut rng(), &ctx),
            Some(Duration::from_seconds(0.15))
        );
    }

    #[test]
    fn manhattan_and_euclidean_differ() {
        let manhattan = SamplerRt::new(&TimeModelData::Distance {
            id: "m".into(),
            description: String::new(),
            speed: 1.0,
            reaction_time: 0.0,
            metric: DistanceMetric::Manhattan,
        });
        let euclidean = SamplerRt::new(&TimeModelData::Distance {
            id: "e".into(),
            description: String::new(),
            speed: 1.0,
            reaction_time: 0.0,
            metric: DistanceMetric::Euclidean,
        });
        let ctx = TimeContext::between([0.0, 0.0], [3.0, 4.0]);
        assert_eq!(manhattan.expected(&ctx), Duration::from_seconds(7.0));
        assert_eq!(euclidean.expected(&ctx), Duration::from_seconds(5.0));
    }

    #[test]
    fn relative_schedule_repeats_when_cyclic() {
        let mut sampler = SamplerRt::new(&TimeModelData::Scheduled {
            id: "tm".into(),
            description: String::new(),
            schedule: vec![1.0, 2.0],
            absolute: false,
            cyclic: true,
        });
        let mut rng = rng();
        let ctx = TimeContext::default();
        let draws: Vec<_> = (0..4).map(|_| sampler.sample(&mut rng, &ctx).unwrap()).collect();
        assert_eq!(
            draws,
            vec![
                Duration::from_seconds(1.0),
                Duration::from_seconds(2.0),
                Duration::from_seconds(1.0),
                Duration::from_seconds(2.0),
            ]
        );
    }

    #[test]
    fn absolute_schedule_yields_gaps() {
        let mut sampler = SamplerRt::new(&TimeModelData::Scheduled {
            id: "tm".into(),
            description: String::new(),
            schedule: vec![3.0, 5.0, 9.0],
            absolute: true,
            cyclic: false,
        });
        let mut rng = rng();
        let ctx = TimeContext::default();
        assert_eq!(sampler.sample(&mut rng, &ctx), Some(Duration::from_seconds(3.0)));
        assert_eq!(sampler.sample(&mut rng, &ctx), Some(Duration::from_seconds(2.0)));
        assert_eq!(sampler.sample(&mut rng, &ctx), Some(Duration::from_seconds(4.0)));
        assert_eq!(sampler.sample(&mut rng, &ctx), None);
    }
}
