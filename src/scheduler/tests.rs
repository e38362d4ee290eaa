use super::*;
use crate::config::SchedulerConfig;
use crate::constants::OVERLAP_SLACK;
use crate::diagnostics::TrajectoryReport;
use crate::error::ScheduleError;
use crate::models::{is_time_ordered, LaneId, Profile, Stream, VehicleId};
use crate::planner::test_support::{mainline_chain, vehicle_plan};
use crate::simulation::memory::{two_stream_simulation, InMemorySimulation, MAINLINE_ROUTE, RAMP_ROUTE};
use crate::simulation::{LaneNetwork, Simulation, VehicleParams};
use std::thread;
use std::time::Duration;

const MAINLINE_MERGE: f64 = 982.56;
const RAMP_MERGE: f64 = 961.47;

fn scheduler() -> MergeScheduler {
    MergeScheduler::new(SchedulerConfig::default()).expect("default config is valid")
}

fn advance_to(sim: &mut InMemorySimulation, time: f64) {
    while sim.time() < time - 1e-9 {
        sim.step();
    }
}

fn arrive(sim: &mut InMemorySimulation, id: &str, route: &str, params: VehicleParams, speed: f64) -> VehicleId {
    sim.spawn_at_depart(id, route, params, speed).expect("spawn");
    VehicleId::from(id)
}

fn slow_params() -> VehicleParams {
    VehicleParams {
        max_speed: 12.0,
        ..VehicleParams::default()
    }
}

/// Follower never gets closer than the margin (within slack) while both
/// trajectories cover the same time, positions compared past the merge.
fn assert_margin_after_merge(follower: &Trajectory, follower_offset: f64, leader: &Trajectory, leader_offset: f64) {
    let margin = follower.safety_margin();
    for sample in &follower.samples {
        if sample.position < follower_offset {
            continue;
        }
        let Some(ahead) = leader.sample_at_or_after(sample.time) else {
            continue;
        };
        let follower_past = sample.position - follower_offset;
        let leader_past = ahead.position - leader_offset;
        assert!(
            follower_past + margin <= leader_past + OVERLAP_SLACK + 0.05,
            "{} at t={:.1} is {:.2} behind {}",
            follower.vehicle_id(),
            sample.time,
            leader_past - follower_past,
            leader.vehicle_id()
        );
    }
}

#[test]
fn test_first_vehicle_runs_unconstrained() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);

    let outcome = scheduler.admit(&mut sim, &m0).expect("admit m.0");
    assert_eq!(outcome.stream, Stream::Mainline);
    assert!(outcome.cascaded.is_empty());
    assert_eq!(outcome.retries, 0);
    assert!((outcome.commitment.position - MAINLINE_MERGE).abs() < 1e-6);
    // 14 m/s accelerating to 20 m/s over ~980 m
    assert!(outcome.commitment.time > 45.0 && outcome.commitment.time < 56.0);

    let trajectory = scheduler.trajectory(&m0).expect("scheduled");
    assert!(TrajectoryReport::analyze(&trajectory).is_consistent());
    let at_commit = trajectory
        .sample_at_or_after(outcome.commitment.time)
        .expect("commit sample");
    assert!((at_commit.position - MAINLINE_MERGE).abs() < 1e-6);
    // Runs on to the end of the route
    let last = trajectory.last().expect("last");
    assert!(last.position > 1400.0);
    assert_eq!(last.lane_id, LaneId::from("E3_0"));

    assert_eq!(scheduler.commitments(), vec![outcome.commitment]);
    assert!(scheduler.check_consistency().is_clean());
}

#[test]
fn test_same_stream_follower_commits_later_with_margin() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    let first = scheduler.admit(&mut sim, &m0).expect("admit m.0");

    advance_to(&mut sim, 5.0);
    let m1 = arrive(&mut sim, "m.1", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    let second = scheduler.admit(&mut sim, &m1).expect("admit m.1");

    assert!(second.commitment.time >= first.commitment.time);
    assert!(second.cascaded.is_empty());

    let leader = scheduler.trajectory(&m0).expect("m.0");
    let follower = scheduler.trajectory(&m1).expect("m.1");
    assert!((follower.first().expect("first").time - 5.0).abs() < 1e-9);
    assert_margin_after_merge(&follower, MAINLINE_MERGE, &leader, MAINLINE_MERGE);

    let admissions = scheduler.stream_admissions(Stream::Mainline);
    assert_eq!(admissions.len(), 2);
    assert_eq!(admissions[1].vehicle_id, m1);
    assert!((admissions[1].time - 5.0).abs() < 1e-9);
    assert!(scheduler.stream_admissions(Stream::Ramp).is_empty());
}

#[test]
fn test_earlier_ramp_vehicle_cascades_slow_mainline_vehicle() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");

    advance_to(&mut sim, 20.0);
    let m1 = arrive(&mut sim, "m.1", MAINLINE_ROUTE, slow_params(), 12.0);
    let slow = scheduler.admit(&mut sim, &m1).expect("admit m.1");
    let before = scheduler.trajectory(&m1).expect("m.1");

    advance_to(&mut sim, 21.0);
    let r0 = arrive(&mut sim, "r.0", RAMP_ROUTE, VehicleParams::default(), 14.0);
    let outcome = scheduler.admit(&mut sim, &r0).expect("admit r.0");

    // r.0 reaches the merge well before the 12 m/s vehicle does
    assert!(outcome.commitment.time < slow.commitment.time);
    assert_eq!(outcome.cascaded, vec![m1.clone()]);
    assert!(outcome.withdrawn.is_empty());

    let commitments = scheduler.commitments();
    assert!(is_time_ordered(&commitments));
    let order: Vec<&str> = commitments.iter().map(|record| record.vehicle_id.as_str()).collect();
    assert_eq!(order, vec!["m.0", "r.0", "m.1"]);

    // Samples already in the past are kept verbatim
    let after = scheduler.trajectory(&m1).expect("m.1 re-planned");
    for (old, new) in before
        .samples
        .iter()
        .zip(&after.samples)
        .take_while(|(old, _)| old.time < 21.0 - 1e-9)
    {
        assert_eq!(old, new);
    }
    assert!(TrajectoryReport::analyze(&after).is_consistent());

    let ramp = scheduler.trajectory(&r0).expect("r.0");
    assert_margin_after_merge(&after, MAINLINE_MERGE, &ramp, RAMP_MERGE);
    let head = scheduler.trajectory(&m0).expect("m.0");
    assert_margin_after_merge(&ramp, RAMP_MERGE, &head, MAINLINE_MERGE);
    assert!(scheduler.check_consistency().is_clean());
}

#[test]
fn test_second_cascaded_vehicle_follows_repaired_first() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");

    advance_to(&mut sim, 20.0);
    let m1 = arrive(&mut sim, "m.1", MAINLINE_ROUTE, slow_params(), 12.0);
    scheduler.admit(&mut sim, &m1).expect("admit m.1");
    advance_to(&mut sim, 24.0);
    let m2 = arrive(&mut sim, "m.2", MAINLINE_ROUTE, slow_params(), 12.0);
    scheduler.admit(&mut sim, &m2).expect("admit m.2");

    advance_to(&mut sim, 25.0);
    let r0 = arrive(&mut sim, "r.0", RAMP_ROUTE, VehicleParams::default(), 14.0);
    let outcome = scheduler.admit(&mut sim, &r0).expect("admit r.0");

    assert_eq!(outcome.cascaded, vec![m1.clone(), m2.clone()]);
    assert!(outcome.withdrawn.is_empty());
    let commitments = scheduler.commitments();
    assert!(is_time_ordered(&commitments));
    let order: Vec<&str> = commitments.iter().map(|record| record.vehicle_id.as_str()).collect();
    assert_eq!(order, vec!["m.0", "r.0", "m.1", "m.2"]);

    let ramp = scheduler.trajectory(&r0).expect("r.0");
    let first = scheduler.trajectory(&m1).expect("m.1");
    let second = scheduler.trajectory(&m2).expect("m.2");
    assert_margin_after_merge(&first, MAINLINE_MERGE, &ramp, RAMP_MERGE);
    assert_margin_after_merge(&second, MAINLINE_MERGE, &first, MAINLINE_MERGE);
    assert!(TrajectoryReport::analyze(&second).is_consistent());
    assert!(scheduler.check_consistency().is_clean());
}

#[test]
fn test_failed_cascade_repair_withdraws_only_that_vehicle() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    let head = scheduler.admit(&mut sim, &m0).expect("admit m.0");
    let head_trajectory = scheduler.trajectory(&m0).expect("m.0");

    advance_to(&mut sim, 20.0);
    let m1 = arrive(&mut sim, "m.1", MAINLINE_ROUTE, slow_params(), 12.0);
    scheduler.admit(&mut sim, &m1).expect("admit m.1");
    // Without its planning context m.1 cannot be re-planned
    lock_or_recover(&scheduler.state).vehicles.remove(&m1);

    advance_to(&mut sim, 21.0);
    let r0 = arrive(&mut sim, "r.0", RAMP_ROUTE, VehicleParams::default(), 14.0);
    let outcome = scheduler.admit(&mut sim, &r0).expect("admit r.0");

    assert_eq!(outcome.withdrawn, vec![m1.clone()]);
    assert!(outcome.cascaded.is_empty());
    assert!(!sim.has_vehicle(&m1));
    assert!(scheduler.trajectory(&m1).is_none());
    assert!(sim.has_vehicle(&r0));

    let commitments = scheduler.commitments();
    assert_eq!(commitments.len(), 2);
    assert_eq!(commitments[0], head.commitment);
    assert_eq!(commitments[1], outcome.commitment);
    assert_eq!(*scheduler.trajectory(&m0).expect("m.0"), *head_trajectory);
    assert!(scheduler.check_consistency().is_clean());
}

#[test]
fn test_exhausted_entry_retries_withdraw_vehicle() {
    let config = SchedulerConfig {
        max_entry_retries: 3,
        ..SchedulerConfig::default()
    };
    let scheduler = MergeScheduler::new(config).expect("config");
    let mut sim = two_stream_simulation(0.1);

    // A committed mainline vehicle that clears the merge and then sits just
    // before it: every entry behind it overlaps
    let blocker = VehicleId::from("m.0");
    let mut profile = Profile::default();
    for i in 0..3_000 {
        let t = f64::from(i) * 0.1;
        if i <= 92 {
            profile.push(t, 900.0 + 10.0 * t, 10.0);
        } else {
            profile.push(t, 975.0, 0.0);
        }
    }
    let trajectory = Trajectory::from_profile(vehicle_plan("m.0", mainline_chain()).frame, &profile);
    let record = CommitmentRecord {
        vehicle_id: blocker.clone(),
        time: 8.3,
        speed: 10.0,
        position: 983.0,
    };
    {
        let mut state = lock_or_recover(&scheduler.state);
        state.trajectories.insert(blocker.clone(), Arc::new(trajectory));
        state.commitments.push(record.clone());
        scheduler.publish(&state);
    }

    let r0 = arrive(&mut sim, "r.0", RAMP_ROUTE, VehicleParams::default(), 14.0);
    let result = scheduler.admit(&mut sim, &r0);

    assert!(
        matches!(&result, Err(ScheduleError::MergeInfeasible { vehicle, retries: 3 }) if *vehicle == r0),
        "{result:?}"
    );
    assert!(!sim.has_vehicle(&r0));
    assert!(scheduler.trajectory(&r0).is_none());
    assert_eq!(scheduler.commitments(), vec![record]);
    assert!(scheduler.stream_admissions(Stream::Ramp).is_empty());
}

#[test]
fn test_departed_stream_leader_leaves_follower_unconstrained() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");
    assert!(scheduler.release(&m0));
    assert!(!scheduler.release(&m0));

    advance_to(&mut sim, 2.0);
    let m1 = arrive(&mut sim, "m.1", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    let outcome = scheduler.admit(&mut sim, &m1).expect("admit m.1");
    assert!(outcome.commitment.time >= scheduler.commitments()[0].time);
    // The released vehicle's commitment stays as history
    assert_eq!(scheduler.commitments().len(), 2);
    assert!(scheduler.trajectory(&m0).is_none());
}

#[test]
fn test_unknown_stream_is_rejected() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let stray = arrive(&mut sim, "x.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);

    let result = scheduler.admit(&mut sim, &stray);
    assert!(matches!(result, Err(ScheduleError::UnknownStream(id)) if id == stray));
    assert!(scheduler.commitments().is_empty());
}

#[test]
fn test_double_admission_is_rejected() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");

    let result = scheduler.admit(&mut sim, &m0);
    assert!(matches!(result, Err(ScheduleError::AlreadyAdmitted(_))));
    assert_eq!(scheduler.commitments().len(), 1);
    assert!(sim.has_vehicle(&m0));
}

#[test]
fn test_vehicle_without_lane_is_withdrawn() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    sim.spawn_pending("m.0", MAINLINE_ROUTE, VehicleParams::default())
        .expect("pending");
    let m0 = VehicleId::from("m.0");

    let result = scheduler.admit(&mut sim, &m0);
    assert!(matches!(result, Err(ScheduleError::NotOnLane(_))));
    assert!(!sim.has_vehicle(&m0));
    assert!(scheduler.trajectory(&m0).is_none());
}

#[test]
fn test_missing_topology_withdraws_vehicle() {
    // E0 leads nowhere, so the lane chain cannot reach the route's next edge
    let mut network = LaneNetwork::default();
    network.add_lane("E0_0", "E0", 975.0, 20.0);
    network.add_lane("E2_0", "E2", 300.0, 20.0);
    let mut sim = InMemorySimulation::new(network, 0.1);
    sim.add_route(MAINLINE_ROUTE, vec!["E0".into(), "E2".into()]);
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);

    let scheduler = scheduler();
    let result = scheduler.admit(&mut sim, &m0);
    assert!(matches!(result, Err(ScheduleError::TopologyUnavailable { .. })));
    assert!(!sim.has_vehicle(&m0));
    assert!(scheduler.commitments().is_empty());
}

#[test]
fn test_trajectory_for_and_exhaustion() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");

    let (lane, offset) = scheduler.trajectory_for(&m0, 1.0).expect("early sample");
    assert_eq!(lane, LaneId::from("E0_0"));
    assert!(offset > 5.0 && offset < 30.0);

    let end = scheduler.trajectory(&m0).expect("m.0").last().expect("last").time;
    assert!(scheduler.trajectory_for(&m0, end + 1.0).is_none());
    assert!(scheduler.trajectory_for(&VehicleId::from("m.9"), 1.0).is_none());
}

#[test]
fn test_readers_never_see_partial_schedule() {
    let mut sim = two_stream_simulation(0.1);
    let scheduler = scheduler();

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut checked = 0;
            for _ in 0..200 {
                let snapshot = scheduler.snapshot();
                assert!(is_time_ordered(&snapshot.commitments));
                for trajectory in snapshot.trajectories.values() {
                    assert!(TrajectoryReport::analyze(trajectory).is_consistent());
                }
                checked += snapshot.trajectories.len();
                thread::sleep(Duration::from_millis(1));
            }
            checked
        });

        let arrivals = [
            ("m.0", MAINLINE_ROUTE, 0.0),
            ("r.0", RAMP_ROUTE, 2.0),
            ("m.1", MAINLINE_ROUTE, 4.0),
            ("r.1", RAMP_ROUTE, 6.0),
        ];
        for (id, route, time) in arrivals {
            advance_to(&mut sim, time);
            let vehicle = arrive(&mut sim, id, route, VehicleParams::default(), 14.0);
            scheduler.admit(&mut sim, &vehicle).expect("admit");
        }
        reader.join().expect("reader thread");
    });

    assert_eq!(scheduler.snapshot().trajectories.len(), 4);
    assert!(scheduler.check_consistency().is_clean());
}

#[test]
fn test_diagnostics_worker_lifecycle() {
    let config = SchedulerConfig {
        diagnostics: true,
        diagnostics_interval_ms: 5,
        ..SchedulerConfig::default()
    };
    let mut sim = two_stream_simulation(0.1);
    let scheduler = MergeScheduler::new(config).expect("config");
    let m0 = arrive(&mut sim, "m.0", MAINLINE_ROUTE, VehicleParams::default(), 14.0);
    scheduler.admit(&mut sim, &m0).expect("admit m.0");

    let mut report = None;
    for _ in 0..400 {
        report = scheduler.latest_report().filter(|report| report.vehicles == 1);
        if report.is_some() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(report.expect("diagnostics report").is_clean());

    scheduler.shutdown();
    scheduler.shutdown();
    assert!(scheduler.latest_report().is_none());
}
