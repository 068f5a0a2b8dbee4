use std::collections::BTreeMap;

use courier_game::RngBundle;
use courier_game::weather::{
    UniformRange, WeatherConfig, WeatherConfigError, WeatherProcess, WeatherShift,
};

fn drive(process: &mut WeatherProcess, rng: &RngBundle, seconds: u32) -> Vec<WeatherShift> {
    let mut shifts = Vec::new();
    for _ in 0..seconds * 4 {
        if let Some(shift) = process.update(0.25, &mut *rng.weather()) {
            shifts.push(shift);
        }
    }
    shifts
}

#[test]
fn same_seed_replays_the_same_weather() {
    let rng_one = RngBundle::from_user_seed(42);
    let rng_two = RngBundle::from_user_seed(42);
    let mut one = WeatherProcess::new(WeatherConfig::default_config(), &mut *rng_one.weather());
    let mut two = WeatherProcess::new(WeatherConfig::default_config(), &mut *rng_two.weather());

    let shifts_one = drive(&mut one, &rng_one, 900);
    let shifts_two = drive(&mut two, &rng_two, 900);
    assert_eq!(shifts_one, shifts_two, "weather should be seed-stable");
    assert_eq!(one.snapshot(), two.snapshot());
    assert!(one.transitions() > 0);
}

#[test]
fn multipliers_stay_in_bounds_through_blends() {
    let rng = RngBundle::from_user_seed(7);
    let config = WeatherConfig::default_config();
    let min_speed = config.min_speed;
    let mut process = WeatherProcess::new(config, &mut *rng.weather());
    for _ in 0..3600 {
        process.update(0.5, &mut *rng.weather());
        let speed = process.speed_multiplier();
        let cost = process.stamina_cost_multiplier();
        assert!((min_speed..=1.0).contains(&speed), "speed {speed}");
        assert!(cost >= 1.0, "stamina cost {cost}");
        let intensity = process.intensity();
        assert!((0.0..=1.0).contains(&intensity));
    }
}

#[test]
fn every_blend_settles_on_its_target() {
    let rng = RngBundle::from_user_seed(99);
    let mut process = WeatherProcess::new(WeatherConfig::default_config(), &mut *rng.weather());
    let shifts = drive(&mut process, &rng, 1800);

    let mut pending: Option<String> = None;
    for shift in shifts {
        match shift {
            WeatherShift::Began { from, to } => {
                assert!(pending.is_none(), "blend began while another was running");
                assert_ne!(from, to);
                pending = Some(to);
            }
            WeatherShift::Settled { condition } => {
                assert_eq!(pending.take(), Some(condition));
            }
        }
    }
}

#[test]
fn commits_wait_for_the_blend() {
    let rng = RngBundle::from_user_seed(3);
    let mut config = WeatherConfig::default_config();
    config.transition = BTreeMap::from([(
        "clear".to_string(),
        BTreeMap::from([("storm".to_string(), 1.0)]),
    )]);
    config.burst_secs = UniformRange::new(10.0, 10.0);
    config.blend_secs = UniformRange::new(4.0, 4.0);
    let mut process = WeatherProcess::new(config, &mut *rng.weather());

    assert!(process.update(9.0, &mut *rng.weather()).is_none());
    let began = process.update(1.0, &mut *rng.weather());
    assert_eq!(
        began,
        Some(WeatherShift::Began {
            from: "clear".into(),
            to: "storm".into()
        })
    );
    process.update(2.0, &mut *rng.weather());
    assert_eq!(process.condition(), "clear");
    let snapshot = process.snapshot();
    assert_eq!(snapshot.blending_to.as_deref(), Some("storm"));
    assert!((snapshot.blend_progress - 0.5).abs() < 1e-9);

    let settled = process.update(2.0, &mut *rng.weather());
    assert_eq!(
        settled,
        Some(WeatherShift::Settled {
            condition: "storm".into()
        })
    );
    assert_eq!(process.condition(), "storm");
    assert!(!process.is_blending());
}

#[test]
fn missing_transition_row_falls_back_to_uniform_choice() {
    let rng = RngBundle::from_user_seed(5);
    let mut config = WeatherConfig::default_config();
    config.initial.condition = "heat".into();
    config.transition.remove("heat");
    config.burst_secs = UniformRange::new(1.0, 1.0);
    let known: Vec<String> = config
        .known_conditions()
        .into_iter()
        .map(str::to_string)
        .collect();
    let mut process = WeatherProcess::new(config, &mut *rng.weather());

    for _ in 0..8 {
        process.update(0.5, &mut *rng.weather());
    }
    if let Some(blend) = process.blend() {
        assert!(known.contains(&blend.to_condition));
    } else {
        assert!(known.iter().any(|label| label == process.condition()));
    }
}

#[test]
fn invalid_configs_are_rejected() {
    let err = WeatherConfig::from_json(r#"{"burst_secs": {"min": 10, "max": 5}}"#).unwrap_err();
    assert!(matches!(
        err,
        WeatherConfigError::Range {
            field: "burst_secs",
            ..
        }
    ));

    let err = WeatherConfig::from_json(r#"{"intensity_range": {"min": 0.2, "max": 1.4}}"#)
        .unwrap_err();
    assert!(matches!(err, WeatherConfigError::Unit { .. }));

    assert!(matches!(
        WeatherConfig::from_json("not json"),
        Err(WeatherConfigError::Parse(_))
    ));

    let wrapped = WeatherConfig::from_json(r#"{"data": {"initial": {"condition": "fog"}}}"#)
        .unwrap();
    assert_eq!(wrapped.initial.condition, "fog");
}
