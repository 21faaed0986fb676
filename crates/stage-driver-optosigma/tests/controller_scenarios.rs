//! End-to-end controller scenarios against the scripted mock transport.
//!
//! Run with: cargo test -p stage-driver-optosigma --test controller_scenarios

use stage_core::mock::{Exchange, MockHandle, MockResourceManager, MockTransport};
use stage_core::{
    ApplyResult, Family, FaultKind, LimitDirection, LoopMode, MotionCommand, MotionController,
    PollSettings, PollState, SpeedProfile, StageError, TransportError, Unit,
};
use stage_driver_optosigma::Controller;
use std::sync::Arc;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(5);

fn attached(family: Family, budget: Duration) -> (Controller, MockHandle) {
    let (transport, handle) = MockTransport::new();
    let controller =
        Controller::from_transport(family, Box::new(transport)).with_poll_settings(PollSettings {
            interval: INTERVAL,
            timeout: budget,
        });
    (controller, handle)
}

fn shrc() -> (Controller, MockHandle) {
    attached(Family::Shrc203, Duration::from_millis(200))
}

// =============================================================================
// Speed
// =============================================================================

#[test]
fn set_speed_writes_exactly_one_line() {
    let (mut controller, handle) = shrc();
    controller.set_speed(100, 1000, 50, 1).unwrap();

    assert_eq!(handle.exchanges(), vec![Exchange::Write("D:1,100,1000,50".into())]);
    assert_eq!(
        controller.speed_profile(1).unwrap(),
        Some(SpeedProfile::new(100, 1000, 50).unwrap())
    );
}

#[test]
fn equal_initial_and_final_speed_is_accepted() {
    let (mut controller, handle) = shrc();
    controller.set_speed(500, 500, 1, 3).unwrap();
    assert_eq!(handle.writes(), vec!["D:3,500,500,1"]);
}

#[test]
fn invalid_speed_tuples_write_nothing() {
    let (mut controller, handle) = shrc();

    for (initial, final_speed, accel) in [(0, 100, 10), (200, 100, 10), (10, 100, 0)] {
        let err = controller.set_speed(initial, final_speed, accel, 1).unwrap_err();
        assert!(matches!(err, StageError::Validation(_)), "{err}");
    }
    assert!(handle.exchanges().is_empty());
    assert_eq!(controller.speed_profile(1).unwrap(), None);
}

// =============================================================================
// Motion and ready-poll
// =============================================================================

#[test]
fn move_to_zero_keeps_explicit_sign() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["R"]);

    assert_eq!(controller.move_to(0, 1).unwrap(), 0);
    assert_eq!(handle.writes(), vec!["A:1+P0", "G:"]);
}

#[test]
fn move_to_on_ready_axis_polls_once() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["R"]);

    controller.move_to(1000, 1).unwrap();

    assert_eq!(handle.query_count("!:1S"), 1);
    assert_eq!(controller.position(1).unwrap(), Some(1000));
    let report = controller.last_poll().unwrap();
    assert_eq!(report.state, PollState::Ready);
    assert_eq!(report.polls, 1);
}

#[test]
fn move_waits_through_busy_replies() {
    let (mut controller, handle) = shrc();
    handle.reply("!:2S", &["B", "B", "B", "R"]);

    controller.move_to(500, 2).unwrap();

    assert_eq!(handle.query_count("!:2S"), 4);
    let report = controller.last_poll().unwrap();
    assert_eq!(report.polls, 4);
    assert!(report.elapsed >= INTERVAL * 3, "elapsed {:?}", report.elapsed);
    assert_eq!(handle.writes(), vec!["A:2+P500", "G:"]);
}

#[test]
fn move_uses_the_designated_unit() {
    let (mut controller, handle) = shrc();
    handle.reply("!:3S", &["R"]);

    assert_eq!(controller.set_unit(Unit::Micrometer, 3).unwrap(), ApplyResult::Applied);
    controller.move_to(250, 3).unwrap();

    assert_eq!(handle.writes(), vec!["A:3+U250", "G:"]);
}

#[test]
fn always_busy_axis_times_out_within_budget() {
    let (mut controller, handle) = attached(Family::Shrc203, Duration::from_millis(40));
    handle.reply("!:1S", &["B"]);
    handle.reply("SRQ:1S", &["1"]);

    let err = controller.wait_ready(1).unwrap_err();
    assert!(matches!(err, StageError::Timeout { axis: 1, .. }), "{err}");
    assert!(err.is_retryable());

    let report = controller.last_poll().unwrap();
    assert_eq!(report.state, PollState::TimedOut);
    assert!(report.elapsed >= Duration::from_millis(40));
    assert!(report.elapsed < Duration::from_secs(2));
    // Diagnostic error check after the timeout leaves the session usable.
    assert!(handle.query_count("SRQ:1S") >= 1);
    assert!(!controller.is_poisoned());
}

#[test]
fn timed_out_move_keeps_previous_position() {
    let (mut controller, handle) = attached(Family::Shrc203, Duration::from_millis(20));
    handle.reply("!:1S", &["R"]);
    handle.reply("SRQ:1S", &["1"]);
    controller.move_to(100, 1).unwrap();

    handle.reply("!:1S", &["B"]);
    assert!(controller.move_to(900, 1).is_err());
    assert_eq!(controller.position(1).unwrap(), Some(100));
}

#[test]
fn unknown_status_code_is_a_decode_error_and_cache_is_untouched() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["R"]);
    controller.move_to(100, 1).unwrap();

    handle.reply("!:1S", &["ZZZ"]);
    let err = controller.move_to(500, 1).unwrap_err();
    assert!(matches!(err, StageError::Decode { .. }), "{err}");
    assert_eq!(controller.position(1).unwrap(), Some(100));
}

#[test]
fn limit_stop_surfaces_as_axis_error() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["B", "FFFFF"]);

    let err = controller.move_relative(100_000, 1).unwrap_err();
    match err {
        StageError::Axis(fault) => {
            assert_eq!(fault.axis, 1);
            assert_eq!(fault.kind, FaultKind::Limit(LimitDirection::Cw));
            assert!(fault.is_limit());
        }
        other => panic!("expected axis fault, got {other}"),
    }
}

#[test]
fn relative_moves_follow_the_cache() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["R"]);

    assert_eq!(controller.move_relative(40, 1).unwrap(), None);
    controller.home(1).unwrap();
    assert_eq!(controller.position(1).unwrap(), Some(0));
    assert_eq!(controller.move_relative(-40, 1).unwrap(), Some(-40));

    controller.stop(1).unwrap();
    assert_eq!(controller.position(1).unwrap(), None);
    assert_eq!(
        handle.writes(),
        vec!["M:1+P40", "G:", "H:1", "M:1-P40", "G:", "L:1"]
    );
}

#[test]
fn query_position_discards_first_reply() {
    let (mut controller, handle) = shrc();
    handle.reply("Q:S2", &["garbage", "2,+1234,R"]);

    assert_eq!(controller.query_position(2).unwrap(), 1234);
    assert_eq!(handle.query_count("Q:S2"), 2);
    assert_eq!(controller.position(2).unwrap(), Some(1234));
}

#[test]
fn query_position_requeries_undecodable_replies() {
    let (mut controller, handle) = shrc();
    handle.reply("Q:S1", &["x", "x", "x", "1,-77,R"]);

    assert_eq!(controller.query_position(1).unwrap(), -77);
    assert_eq!(handle.query_count("Q:S1"), 4);
}

// =============================================================================
// Family differences
// =============================================================================

#[test]
fn gsc_status_is_a_single_query() {
    let (mut controller, handle) = attached(Family::Gsc02, Duration::from_millis(200));
    handle.reply("Q:", &["+       0,+       0,K,K,R"]);

    controller.move_to(300, 2).unwrap();

    assert_eq!(handle.writes(), vec!["A:2+P300", "G:"]);
    assert_eq!(handle.query_count("Q:"), 1);
    assert_eq!(controller.set_unit(Unit::Millimeter, 1).unwrap(), ApplyResult::Unsupported("unit"));
    assert_eq!(controller.set_loop(LoopMode::Closed, 1).unwrap(), ApplyResult::Unsupported("loop"));
}

#[test]
fn gsc_homing_off_a_limit_switch_keeps_polling() {
    let (mut controller, handle) = attached(Family::Gsc02, Duration::from_millis(200));
    handle.reply("Q:", &["+0,+0,K,L,B", "+0,+0,K,L,B", "+0,+0,K,K,R"]);

    controller.home(1).unwrap();

    assert_eq!(handle.writes(), vec!["H:1"]);
    assert_eq!(handle.query_count("Q:"), 3);
    assert_eq!(controller.position(1).unwrap(), Some(0));
}

#[test]
fn sbis26_homing_off_a_limit_switch_keeps_polling() {
    let (mut controller, handle) = attached(Family::Sbis26, Duration::from_millis(200));
    handle.reply("SRQ:D,1", &["D,1,+0,W,B", "D,1,+0,W,B", "D,1,+0,K,R"]);

    controller.home(1).unwrap();

    assert_eq!(handle.writes(), vec!["H:D,1"]);
    assert_eq!(handle.query_count("SRQ:D,1"), 4);
    assert_eq!(controller.position(1).unwrap(), Some(0));
}

#[test]
fn sbis26_moves_without_go_and_double_queries() {
    let (mut controller, handle) = attached(Family::Sbis26, Duration::from_millis(200));
    handle.reply("SRQ:D,3", &["D,3,+0,K,B", "D,3,+0,K,R"]);

    controller.move_to(-1200, 3).unwrap();

    assert_eq!(handle.writes(), vec!["A:D,3,-1200"]);
    assert_eq!(handle.query_count("SRQ:D,3"), 2);
}

#[test]
fn move_axes_stages_all_then_goes_once() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["R"]).reply("!:3S", &["B", "R"]);
    let speed = SpeedProfile::new(100, 2000, 100).unwrap();

    controller
        .move_axes(&[
            MotionCommand::absolute(1, 1000).with_speed(speed),
            MotionCommand::relative(3, -50),
        ])
        .unwrap();

    assert_eq!(
        handle.writes(),
        vec!["D:1,100,2000,100", "A:1+P1000", "M:3-P50", "G:"]
    );
    assert_eq!(controller.position(1).unwrap(), Some(1000));
    assert_eq!(controller.position(3).unwrap(), None);
}

#[test]
fn move_axes_rejects_duplicate_axes_before_writing() {
    let (mut controller, handle) = shrc();
    let err = controller
        .move_axes(&[MotionCommand::absolute(1, 1), MotionCommand::absolute(1, 2)])
        .unwrap_err();
    assert!(matches!(err, StageError::Validation(_)));
    assert!(handle.exchanges().is_empty());
}

#[test]
fn set_loop_and_readback_on_shrc() {
    let (mut controller, handle) = shrc();
    handle.reply("?:F2", &["0"]);

    assert_eq!(controller.set_loop(LoopMode::Open, 2).unwrap(), ApplyResult::Applied);
    assert_eq!(controller.query_loop(2).unwrap(), Some(LoopMode::Closed));
    assert_eq!(handle.writes(), vec!["F:21"]);
}

#[test]
fn emergency_stop_on_sbis26_uses_one_line() {
    let (mut controller, handle) = attached(Family::Sbis26, Duration::from_millis(200));
    for axis in 1..=3 {
        let command = format!("SRQ:D,{axis}");
        let reply = format!("D,{axis},+10,K,R");
        handle.reply(&command, &[reply.as_str()]);
    }

    controller.emergency_stop().unwrap();
    assert_eq!(handle.writes(), vec!["LE:A"]);
}

#[test]
fn check_error_reports_pending_fault() {
    let (mut controller, handle) = shrc();
    handle.reply("SRQ:2S", &["3"]);

    let fault = controller.check_error(2).unwrap().unwrap();
    assert_eq!(fault.kind, FaultKind::Code("3".into()));
    assert_eq!(fault.message, "Command error");

    handle.reply("SRQ:2S", &["1"]);
    assert!(controller.check_error(2).unwrap().is_none());

    handle.reply("SRQ:2S", &["U2,K,K,K,R"]);
    assert!(controller.check_error(2).unwrap().is_none());

    handle.reply("SRQ:2S", &["7FFFF"]);
    assert!(controller.check_error(2).unwrap().is_none());
}

#[test]
fn settled_outside_in_position_range_counts_as_ready() {
    let (mut controller, handle) = shrc();
    handle.reply("!:1S", &["1FFFF", "FFFF"]);

    controller.move_to(800, 1).unwrap();
    assert_eq!(handle.query_count("!:1S"), 2);
    assert_eq!(controller.position(1).unwrap(), Some(800));
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[test]
fn close_is_idempotent() {
    let (mut controller, handle) = shrc();
    controller.close();
    controller.close();
    drop(controller);
    assert_eq!(handle.close_count(), 1);
}

#[test]
fn io_failure_poisons_until_reconnect() {
    let (manager, handle) = MockResourceManager::new();
    let mut controller = Controller::with_resources(Family::Shrc203, Arc::new(manager))
        .with_poll_settings(PollSettings {
            interval: INTERVAL,
            timeout: Duration::from_millis(200),
        });
    controller.connect("ASRL1::INSTR").unwrap();
    handle.reply("!:1S", &["R"]);

    handle.fail_on("G:");
    assert!(matches!(
        controller.move_to(10, 1),
        Err(StageError::Transport(TransportError::Io { .. }))
    ));
    assert!(controller.is_poisoned());

    handle.clear_failure();
    handle.clear_log();
    let err = controller.home(1).unwrap_err();
    assert!(matches!(err, StageError::Transport(TransportError::Poisoned(_))));
    assert!(err.requires_reopen());
    assert!(handle.exchanges().is_empty());

    controller.close();
    controller.connect("ASRL1::INSTR").unwrap();
    controller.home(1).unwrap();
    assert_eq!(handle.writes(), vec!["MODE:HOST", "H:1"]);
}
