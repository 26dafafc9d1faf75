//! End-to-end debug sessions against the in-process simulator: the full
//! command surface driven through the protocol layer exactly as a socket
//! session would drive it.

use proptest as _;
use rstest as _;
use tempfile as _;
use thiserror as _;
use tracing as _;

use dzrp_remote::{
    connect, Frame, LinkEvent, RemoteProtocol, SessionConfig, SimTransport, StopReason, Transport,
    PROGRAM_VERSION, STATUS_UNKNOWN_COMMAND,
};
use std::time::Duration;
use z80_core::{CpuTimingConfig, FlatMemory, ATTR_WRITE_WATCH};

const STOP_WAIT: Duration = Duration::from_millis(3000);

fn simulator_session() -> RemoteProtocol {
    connect(&SessionConfig::simulator()).expect("simulator sessions cannot fail")
}

#[test]
fn init_handshake_reports_the_program_version() {
    let session = simulator_session();
    assert_eq!(session.init().expect("handshake"), PROGRAM_VERSION);
    session.close_session().expect("orderly close");
}

#[test]
fn registers_read_back_what_was_written() {
    let session = simulator_session();

    session.set_register(0, 0x1234).expect("pc");
    session.set_register(2, 0xA55A).expect("af");
    session.set_register(6, 0xC0DE).expect("ix");

    let registers = session.get_registers().expect("image");
    assert_eq!(registers.pc(), 0x1234);
    assert_eq!(registers.af(), 0xA55A);
    assert_eq!(registers.ix(), 0xC0DE);

    // Slot 15 does not exist; the simulator rejects it.
    assert!(session.set_register(15, 1).is_err());
}

#[test]
fn memory_reads_echo_memory_writes() {
    let session = simulator_session();

    let payload: Vec<u8> = (0_u16..256).map(|n| (n & 0xFF) as u8).collect();
    session.write_memory(0x4000, &payload).expect("write");

    let read = session.read_memory(0x4000, 256).expect("read");
    assert_eq!(read, payload);

    // Wrap-around at the address-space end behaves like the CPU's own view.
    session.write_memory(0xFFFF, &[0xAA, 0xBB]).expect("write");
    let read = session.read_memory(0xFFFF, 2).expect("read");
    assert_eq!(read, vec![0xAA, 0xBB]);
}

#[test]
fn continue_stops_at_an_installed_breakpoint() {
    let session = simulator_session();

    session.write_memory(0x0000, &[0x00; 16]).expect("program");
    let id = session.add_breakpoint(0x0003).expect("install");
    session.continue_with(None, None).expect("resume");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Breakpoint { addr: 0x0003 });
    assert_eq!(session.get_registers().expect("image").pc(), 0x0003);

    session.remove_breakpoint(id).expect("remove");
    assert!(session.remove_breakpoint(id).is_err(), "already removed");
}

#[test]
fn temporary_breakpoints_serve_stepping() {
    let session = simulator_session();

    session.write_memory(0x0000, &[0x00; 16]).expect("program");
    // Step-over style: run to the next instruction boundary only.
    session.continue_with(Some(0x0001), None).expect("resume");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Breakpoint { addr: 0x0001 });
}

#[test]
fn pause_interrupts_a_tight_loop() {
    let session = simulator_session();

    // JR -2: spins forever at address 0.
    session.write_memory(0x0000, &[0x18, 0xFE]).expect("program");
    session.continue_with(None, None).expect("resume");

    std::thread::sleep(Duration::from_millis(50));
    session.pause().expect("pause");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Pause);

    let pc = session.get_registers().expect("image").pc();
    assert!(pc <= 0x0001, "the loop never leaves its two bytes");
}

#[test]
fn halt_with_interrupts_disabled_reports_a_halt_stop() {
    let session = simulator_session();

    session.write_memory(0x0000, &[0xF3, 0x76]).expect("program"); // DI; HALT
    session.continue_with(None, None).expect("resume");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Halt);
    assert_eq!(session.get_registers().expect("image").pc(), 0x0001);
}

#[test]
fn watchpoint_group_triggers_on_a_tagged_write() {
    // The caller owns the memory image and its watch attributes.
    let mut memory = FlatMemory::new();
    // LD A,0x42; LD (0x9000),A; then spin.
    memory.load(0x0000, &[0x3E, 0x42, 0x32, 0x00, 0x90, 0x18, 0xFE]);
    memory.set_attrs(0x9000, 1, ATTR_WRITE_WATCH);

    let config = SessionConfig::simulator();
    let (transport, events) = SimTransport::with_memory(&config, memory);
    let session = RemoteProtocol::new(Box::new(transport), events, &config);

    session.enable_watchpoints(true).expect("supported here");
    session.continue_with(None, None).expect("resume");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Watchpoint { addr: 0x9000 });

    // Disabled group: the same program runs through to its spin loop.
    session.set_register(0, 0x0000).expect("rewind pc");
    session.enable_watchpoints(false).expect("supported here");
    session.continue_with(Some(0x0005), None).expect("resume");
    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    assert_eq!(reason, StopReason::Breakpoint { addr: 0x0005 });
}

#[test]
fn state_save_restore_round_trips_registers_and_memory() {
    let session = simulator_session();

    session.set_register(0, 0x8000).expect("pc");
    session.set_register(5, 0xBEEF).expect("hl");
    session.write_memory(0x8000, &[0x11, 0x22, 0x33]).expect("write");

    let state = session.save_state().expect("capture");

    // Disturb everything, then restore.
    session.set_register(0, 0x0000).expect("pc");
    session.set_register(5, 0x0000).expect("hl");
    session.write_memory(0x8000, &[0xFF, 0xFF, 0xFF]).expect("write");

    session.restore_state(&state).expect("restore");

    let registers = session.get_registers().expect("image");
    assert_eq!(registers.pc(), 0x8000);
    assert_eq!(registers.hl(), 0xBEEF);
    assert_eq!(
        session.read_memory(0x8000, 3).expect("read"),
        vec![0x11, 0x22, 0x33]
    );

    // A truncated blob is rejected without touching state.
    assert!(session.restore_state(&state[..10]).is_err());
    assert_eq!(session.get_registers().expect("image").pc(), 0x8000);
}

#[test]
fn im0_interrupt_delivery_surfaces_a_fatal_error_stop() {
    // Tight interrupt period so the window closes within a few
    // instructions; the core powers on in mode 0.
    let config = SessionConfig {
        timing: CpuTimingConfig {
            interrupt_period_tstates: 8,
            cpu_load_range: 1,
        },
        ..SessionConfig::simulator()
    };
    let session = connect(&config).expect("simulator");

    // EI; NOP; NOP: interrupts enabled, mode 0 vectoring is unsupported.
    session.write_memory(0x0000, &[0xFB, 0x00, 0x00]).expect("program");
    session.continue_with(None, None).expect("resume");

    let reason = session
        .wait_for_stop(STOP_WAIT)
        .expect("no connection loss")
        .expect("stops in time");
    match reason {
        StopReason::Error { message } => {
            assert!(message.contains("interrupt mode 0"), "got {message:?}");
        }
        other => panic!("expected a fatal execution error, got {other:?}"),
    }

    // State is exactly as of the last fully executed instruction.
    let registers = session.get_registers().expect("connection survives");
    assert_eq!(registers.pc(), 0x0002);
}

#[test]
fn unknown_command_codes_are_answered_not_dropped() {
    let config = SessionConfig::simulator();
    let (transport, events) = SimTransport::new(&config);

    transport
        .send(&Frame::new(9, 0xEE, vec![]))
        .expect("queueable");

    match events.recv_timeout(STOP_WAIT) {
        Ok(LinkEvent::Frame(frame)) => {
            assert_eq!(frame.seq, 9);
            assert_eq!(frame.code, STATUS_UNKNOWN_COMMAND);
        }
        other => panic!("expected a status response, got {other:?}"),
    }
}
