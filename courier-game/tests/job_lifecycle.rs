use courier_game::inventory::{Inventory, SortMode};
use courier_game::jobs::{CancelRejection, DeliveryAttempt, PickupRejection};
use courier_game::{Cell, CityGrid, Job, JobError, JobState, JobsManager, RunClock, parse_job_feed};
use rand::SeedableRng;
use rand::rngs::SmallRng;

const FEED: &str = r#"{
  "data": {
    "jobs": [
      { "id": "PKG-1", "pickup": [1, 0], "dropoff": [5, 0], "payout": 180, "weight": 2,
        "priority": 1, "deadline": "2025-09-01T12:05:00Z" },
      { "id": "PKG-2", "pickup": [2, 0], "dropoff": [0, 0], "payout": 90,
        "release_time": 30, "deadline": "2025-09-01T12:01:00Z" },
      { "id": "PKG-3", "pickup": [3, 0], "dropoff": [6, 0], "payout": 300, "weight": 4 },
      { "id": "PKG-4", "pickup": [4, 0], "dropoff": [1, 0], "payout": 50, "deadline": "soon" },
      { "pickup": [0, 0], "dropoff": [1, 0], "payout": 10 },
      { "id": "PKG-1", "pickup": [0, 0], "dropoff": [1, 0], "payout": 10 },
      { "id": "PKG-5", "pickup": "nowhere", "dropoff": [1, 0], "payout": 10 }
    ]
  }
}"#;

fn loaded() -> JobsManager {
    let records = parse_job_feed(FEED).unwrap();
    JobsManager::from_feed(&records, &RunClock::default())
}

#[test]
fn feed_loading_skips_bad_records() {
    let jobs = loaded();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs.skipped().len(), 4);
    assert!(jobs
        .skipped()
        .iter()
        .any(|err| matches!(err, JobError::BadDeadline { id, .. } if id == "PKG-4")));
    assert!(jobs
        .skipped()
        .iter()
        .any(|err| matches!(err, JobError::Duplicate { id } if id == "PKG-1")));
    assert!(jobs
        .skipped()
        .iter()
        .any(|err| matches!(err, JobError::MissingId { index: 4 })));

    let first = jobs.get("PKG-1").unwrap();
    assert_eq!(first.deadline(), Some(300.0));
    assert_eq!(first.state(), JobState::Available);
    assert_eq!(jobs.get("PKG-2").unwrap().state(), JobState::Pending);
    assert_eq!(jobs.get("PKG-3").unwrap().deadline(), None);
}

#[test]
fn release_then_expiry_follow_the_clock() {
    let mut jobs = loaded();
    let report = jobs.update(10.0, Cell::new(0, 0));
    assert!(report.released.is_empty());
    assert_eq!(report.nearby, vec!["PKG-1".to_string()]);

    let report = jobs.update(30.0, Cell::new(0, 0));
    assert_eq!(report.released, vec!["PKG-2".to_string()]);
    assert!(jobs.is_available("PKG-2"));

    let report = jobs.update(61.0, Cell::new(0, 0));
    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].id, "PKG-2");
    assert!(!report.expired[0].was_carried);
    assert!(!jobs.is_available("PKG-2"));

    let report = jobs.update(10_000.0, Cell::new(0, 0));
    assert_eq!(report.expired.len(), 1);
    assert_eq!(jobs.get("PKG-3").unwrap().state(), JobState::Available);

    let stats = jobs.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.expired, 2);
    assert_eq!(stats.available, 1);
}

#[test]
fn pending_job_that_already_expired_never_opens() {
    let mut jobs = JobsManager::new();
    jobs.insert(
        Job::new("late-bloomer", Cell::new(0, 0), Cell::new(1, 0), 40.0, 1.0)
            .with_release_time(50.0)
            .with_deadline(20.0),
    )
    .unwrap();
    let report = jobs.update(60.0, Cell::new(0, 0));
    assert!(report.released.is_empty());
    assert_eq!(jobs.get("late-bloomer").unwrap().state(), JobState::Expired);
}

#[test]
fn pickup_rejections_leave_state_alone() {
    let mut jobs = loaded();
    jobs.update(0.0, Cell::new(0, 0));
    let mut inventory = Inventory::new(5.0);

    assert_eq!(
        jobs.try_pickup("PKG-3", Cell::new(0, 0), &mut inventory, 0.0),
        Err(PickupRejection::OutOfReach {
            id: "PKG-3".into(),
            pickup: Cell::new(3, 0)
        })
    );
    assert_eq!(
        jobs.try_pickup("PKG-2", Cell::new(2, 0), &mut inventory, 0.0),
        Err(PickupRejection::NotAvailable("PKG-2".into()))
    );

    jobs.try_pickup("PKG-1", Cell::new(1, 0), &mut inventory, 1.0)
        .unwrap();
    let over = jobs.try_pickup("PKG-3", Cell::new(3, 0), &mut inventory, 1.0);
    assert!(matches!(over, Err(PickupRejection::OverCapacity { .. })));
    assert!(jobs.is_available("PKG-3"));
    assert_eq!(inventory.len(), 1);
    assert!((inventory.total_weight() - 2.0).abs() < 1e-9);
}

#[test]
fn pickup_of_an_overdue_job_expires_it() {
    let mut jobs = loaded();
    jobs.update(0.0, Cell::new(0, 0));
    let mut inventory = Inventory::new(10.0);
    let result = jobs.try_pickup("PKG-1", Cell::new(1, 0), &mut inventory, 301.0);
    assert_eq!(result, Err(PickupRejection::Expired("PKG-1".into())));
    assert_eq!(jobs.get("PKG-1").unwrap().state(), JobState::Expired);
    assert!(inventory.is_empty());
}

#[test]
fn delivery_works_on_the_selected_job() {
    let mut jobs = loaded();
    jobs.update(0.0, Cell::new(0, 0));
    let mut inventory = Inventory::new(10.0);
    jobs.try_pickup("PKG-1", Cell::new(1, 0), &mut inventory, 0.0)
        .unwrap();
    jobs.try_pickup("PKG-3", Cell::new(3, 0), &mut inventory, 5.0)
        .unwrap();

    inventory.apply_sort(SortMode::Payout, 5.0);
    assert_eq!(inventory.current().map(|item| item.id.as_str()), Some("PKG-1"));
    inventory.select("PKG-3");

    let wrong_place = jobs.try_deliver(&mut inventory, Cell::new(0, 0), 10.0);
    assert!(matches!(wrong_place, DeliveryAttempt::Rejected(_)));

    let DeliveryAttempt::Delivered(job) = jobs.try_deliver(&mut inventory, Cell::new(6, 0), 20.0)
    else {
        panic!("expected delivery");
    };
    assert_eq!(job.id(), "PKG-3");
    assert_eq!(job.state(), JobState::Delivered);
    assert_eq!(job.pickup_time(), Some(5.0));
    assert_eq!(job.delivery_time(), Some(20.0));
    assert_eq!(jobs.completed().count(), 1);
    assert_eq!(inventory.current().map(|item| item.id.as_str()), Some("PKG-1"));
}

#[test]
fn cancel_rules() {
    let mut jobs = loaded();
    jobs.update(0.0, Cell::new(0, 0));
    let mut inventory = Inventory::new(10.0);
    assert_eq!(
        jobs.cancel(None, &mut inventory),
        Err(CancelRejection::NothingSelected)
    );

    jobs.try_pickup("PKG-1", Cell::new(1, 0), &mut inventory, 0.0)
        .unwrap();
    let mut other_inventory = Inventory::new(10.0);
    assert!(matches!(
        jobs.cancel(Some("PKG-1"), &mut other_inventory),
        Err(CancelRejection::NotCancellable { .. })
    ));

    let cancellation = jobs.cancel(None, &mut inventory).unwrap();
    assert!(cancellation.was_carried);
    assert!(inventory.is_empty());
    assert_eq!(jobs.get("PKG-1").unwrap().state(), JobState::Cancelled);
    assert!(matches!(
        jobs.cancel(Some("PKG-1"), &mut inventory),
        Err(CancelRejection::NotCancellable { .. })
    ));
    assert!(matches!(
        jobs.cancel(Some("ghost"), &mut inventory),
        Err(CancelRejection::UnknownJob(_))
    ));
}

#[test]
fn generator_uses_building_frontage_and_degrades() {
    let grid = CityGrid::from_rows(&["CCCCC", "CBBBC", "CCCCC"]).unwrap();
    let mut rng = SmallRng::seed_from_u64(9);
    let mut jobs = JobsManager::new();
    let created = jobs.generate_random_jobs(&grid, 4, 12.0, &mut rng);
    assert_eq!(created, 4);
    let frontage = grid.building_edges();
    for job in jobs.all() {
        assert!(frontage.contains(&job.pickup()));
        assert!(frontage.contains(&job.dropoff()));
        assert_ne!(job.pickup(), job.dropoff());
        let deadline = job.deadline().unwrap();
        assert!((192.0..=432.0).contains(&deadline));
        assert!((120.0..=400.0).contains(&job.payout()));
    }

    let tiny = CityGrid::from_rows(&["CB"]).unwrap();
    let mut few = JobsManager::new();
    assert_eq!(few.generate_random_jobs(&tiny, 3, 0.0, &mut rng), 0);

    let walled = CityGrid::from_rows(&["BBB"]).unwrap();
    assert_eq!(few.generate_random_jobs(&walled, 3, 0.0, &mut rng), 0);
    assert!(few.is_empty());
}
