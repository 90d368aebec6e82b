//! Turns a recipe into an ordered list of pump batches
use std::{collections::HashMap, time::Duration};

use log::debug;

use crate::{
    config::DispensePolicy,
    errors::DispenseError,
    pump::{resolve, PumpMapping},
    recipe::{Cocktail, RecipeLine},
    scaler::scale,
};

/// One pump activation
#[derive(Debug, Clone, PartialEq)]
pub struct PumpRun {
    pub pump_id: u32,
    pub pin: u32,
    pub ingredient_id: String,
    pub volume_ml: f64,
    pub duration_ms: u64,
}

/// Runs started together. The batch is over when its slowest pump stops.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispenseBatch {
    pub runs: Vec<PumpRun>,
    /// Wait after this batch, before the next one starts
    pub settle_delay: Duration,
}

impl DispenseBatch {
    /// Time the batch keeps its busiest pin running. Runs sharing a pin pour one after the
    /// other, so their durations add up.
    pub fn busiest_pin(&self) -> Duration {
        let mut per_pin: HashMap<u32, u64> = HashMap::new();
        for run in &self.runs {
            *per_pin.entry(run.pin).or_insert(0) += run.duration_ms;
        }
        Duration::from_millis(per_pin.into_values().max().unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispenseSchedule {
    pub batches: Vec<DispenseBatch>,
    /// Scaled lines the operator adds by hand
    pub manual_lines: Vec<RecipeLine>,
}

impl DispenseSchedule {
    pub fn runs(&self) -> impl Iterator<Item = &PumpRun> {
        self.batches.iter().flat_map(|batch| batch.runs.iter())
    }
}

/// Builds the schedule for `cocktail` at `target_volume_ml`.
///
/// Every automatic line is resolved and converted before anything is returned, so a missing
/// pump or a broken calibration fails the whole order before a single pump runs. Regular lines
/// pour together in the first batch; floated lines follow one by one in recipe order, after
/// the settle delay.
pub fn build_schedule(
    cocktail: &Cocktail,
    target_volume_ml: f64,
    mapping: &[PumpMapping],
    policy: &DispensePolicy,
) -> Result<DispenseSchedule, DispenseError> {
    let scaled = scale(&cocktail.recipe, target_volume_ml)?;

    let (automatic, manual_lines): (Vec<RecipeLine>, Vec<RecipeLine>) =
        scaled.into_iter().partition(|line| line.is_automatic());

    // Regular lines that land on the same pump pour as one longer run
    let mut immediate: Vec<(&PumpMapping, String, f64)> = Vec::new();
    let mut deferred: Vec<(&PumpMapping, String, f64)> = Vec::new();
    for line in &automatic {
        let pump = resolve(&line.ingredient_id, mapping).ok_or_else(|| {
            DispenseError::UnresolvedIngredient {
                ingredient_id: line.ingredient_id.clone(),
            }
        })?;
        if policy.is_deferred(line) {
            deferred.push((pump, line.ingredient_id.clone(), line.volume));
        } else if let Some(entry) = immediate.iter_mut().find(|(other, _, _)| other.id == pump.id) {
            debug!(
                "[SCHEDULER] {} shares pump {}, merged into one run",
                line.ingredient_id, pump.id
            );
            entry.2 += line.volume;
        } else {
            immediate.push((pump, line.ingredient_id.clone(), line.volume));
        }
    }
    let immediate = to_runs(immediate)?;
    let deferred = to_runs(deferred)?;

    let mut batches = Vec::new();
    if !immediate.is_empty() {
        batches.push(DispenseBatch {
            runs: immediate,
            settle_delay: if deferred.is_empty() {
                Duration::ZERO
            } else {
                policy.settle_delay()
            },
        });
    }
    batches.extend(deferred.into_iter().map(|run| DispenseBatch {
        runs: vec![run],
        settle_delay: Duration::ZERO,
    }));

    Ok(DispenseSchedule {
        batches,
        manual_lines,
    })
}

fn to_runs(lines: Vec<(&PumpMapping, String, f64)>) -> Result<Vec<PumpRun>, DispenseError> {
    let mut runs = Vec::with_capacity(lines.len());
    for (pump, ingredient_id, volume_ml) in lines {
        let duration_ms = pump.run_duration_ms(volume_ml)?;
        if duration_ms == 0 {
            debug!("[SCHEDULER] {} rounds to nothing, skipped", ingredient_id);
            continue;
        }
        debug!(
            "[SCHEDULER] Pump {} (pin {}) pours {} ml of {} in {} ms",
            pump.id, pump.pin, volume_ml, ingredient_id, duration_ms
        );
        runs.push(PumpRun {
            pump_id: pump.id,
            pin: pump.pin,
            ingredient_id,
            volume_ml,
            duration_ms,
        });
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Ingredient;

    fn mai_tai() -> Cocktail {
        Cocktail::new(
            "mai-tai",
            "Mai Tai",
            vec![
                RecipeLine::automatic("rum", 40.0),
                RecipeLine::automatic("juice", 30.0),
                RecipeLine::automatic("grenadine", 10.0),
            ],
        )
    }

    fn pumps() -> Vec<PumpMapping> {
        vec![
            PumpMapping::new(1, 17, "rum", 20.0),
            PumpMapping::new(2, 27, "juice", 15.0),
            PumpMapping::new(3, 22, "grenadine", 10.0),
        ]
    }

    fn durations(batch: &DispenseBatch) -> Vec<(u32, u64)> {
        batch.runs.iter().map(|run| (run.pump_id, run.duration_ms)).collect()
    }

    #[test]
    fn should_schedule_the_mai_tai_in_two_batches() {
        let schedule = build_schedule(&mai_tai(), 300.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(2, schedule.batches.len());
        assert_eq!(vec![(1, 7500), (2, 7533)], durations(&schedule.batches[0]));
        assert_eq!(Duration::from_millis(2000), schedule.batches[0].settle_delay);
        assert_eq!(vec![(3, 3800)], durations(&schedule.batches[1]));
        assert_eq!(Duration::ZERO, schedule.batches[1].settle_delay);
    }

    #[test]
    fn should_convert_60_ml_at_20_ml_per_second_to_3000_ms() {
        let shot = Cocktail::shot(&Ingredient::unlisted("rum"), 60.0);
        let schedule = build_schedule(&shot, 60.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(vec![(1, 3000)], durations(&schedule.batches[0]));
    }

    #[test]
    fn should_pour_floated_lines_one_by_one_in_recipe_order() {
        let cocktail = Cocktail::new(
            "layered",
            "Layered",
            vec![
                RecipeLine::automatic("juice", 50.0).floated(),
                RecipeLine::automatic("rum", 50.0),
                RecipeLine::automatic("grenadine", 10.0),
            ],
        );
        let schedule = build_schedule(&cocktail, 110.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(3, schedule.batches.len());
        assert_eq!(vec![1], schedule.batches[0].runs.iter().map(|r| r.pump_id).collect::<Vec<u32>>());
        assert_eq!(2, schedule.batches[1].runs[0].pump_id);
        assert_eq!(3, schedule.batches[2].runs[0].pump_id);
    }

    #[test]
    fn should_not_wait_when_nothing_is_floated() {
        let cocktail = Cocktail::new(
            "rum-punch",
            "Rum Punch",
            vec![RecipeLine::automatic("rum", 40.0), RecipeLine::automatic("juice", 60.0)],
        );
        let schedule = build_schedule(&cocktail, 100.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(1, schedule.batches.len());
        assert_eq!(Duration::ZERO, schedule.batches[0].settle_delay);
    }

    #[test]
    fn should_start_with_the_float_when_it_is_the_only_line() {
        let shot = Cocktail::shot(&Ingredient::unlisted("grenadine"), 20.0);
        let schedule = build_schedule(&shot, 20.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(1, schedule.batches.len());
        assert_eq!(vec![(3, 2000)], durations(&schedule.batches[0]));
    }

    #[test]
    fn should_fail_naming_the_unresolved_ingredient() {
        let mut mapping = pumps();
        mapping[1].enabled = false;
        let result = build_schedule(&mai_tai(), 300.0, &mapping, &DispensePolicy::default());
        match result {
            Err(DispenseError::UnresolvedIngredient { ingredient_id }) => assert_eq!("juice", ingredient_id),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn should_fail_on_a_broken_calibration() {
        let mut mapping = pumps();
        mapping[2].flow_rate_ml_per_sec = -1.0;
        let result = build_schedule(&mai_tai(), 300.0, &mapping, &DispensePolicy::default());
        assert!(matches!(result, Err(DispenseError::CalibrationFault { pump_id: 3, .. })));
    }

    #[test]
    fn should_merge_regular_lines_poured_by_the_same_pump() {
        let cocktail = Cocktail::new(
            "double-rum",
            "Double Rum",
            vec![
                RecipeLine::automatic("rum", 20.0),
                RecipeLine::automatic("juice", 30.0),
                RecipeLine::automatic("rum", 20.0),
                RecipeLine::automatic("grenadine", 10.0),
            ],
        );
        let schedule = build_schedule(&cocktail, 80.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(2, schedule.batches.len());
        assert_eq!(vec![(1, 2000), (2, 2000)], durations(&schedule.batches[0]));
        assert_eq!(40.0, schedule.batches[0].runs[0].volume_ml);
        assert_eq!(vec![(3, 1000)], durations(&schedule.batches[1]));
    }

    #[test]
    fn should_add_up_runs_sharing_a_pin() {
        let batch = DispenseBatch {
            runs: vec![
                PumpRun {
                    pump_id: 1,
                    pin: 17,
                    ingredient_id: "rum".to_string(),
                    volume_ml: 20.0,
                    duration_ms: 1000,
                },
                PumpRun {
                    pump_id: 2,
                    pin: 27,
                    ingredient_id: "juice".to_string(),
                    volume_ml: 22.5,
                    duration_ms: 1500,
                },
                PumpRun {
                    pump_id: 1,
                    pin: 17,
                    ingredient_id: "rum".to_string(),
                    volume_ml: 20.0,
                    duration_ms: 1000,
                },
            ],
            settle_delay: Duration::ZERO,
        };
        assert_eq!(Duration::from_millis(2000), batch.busiest_pin());
    }

    #[test]
    fn should_leave_manual_lines_to_the_operator() {
        let mut cocktail = mai_tai();
        cocktail.recipe.push(RecipeLine::manual("mint", 20.0, Some("add a sprig of mint")));
        let schedule = build_schedule(&cocktail, 200.0, &pumps(), &DispensePolicy::default()).unwrap();
        assert_eq!(1, schedule.manual_lines.len());
        assert_eq!(40.0, schedule.manual_lines[0].volume);
        assert_eq!(false, schedule.runs().any(|run| run.ingredient_id == "mint"));
    }

    #[test]
    fn should_not_resolve_pumps_for_manual_lines() {
        let cocktail = Cocktail::new(
            "rum-and-mint",
            "Rum and Mint",
            vec![RecipeLine::automatic("rum", 40.0), RecipeLine::manual("mint", 10.0, None)],
        );
        assert_eq!(true, build_schedule(&cocktail, 50.0, &pumps(), &DispensePolicy::default()).is_ok());
    }
}
