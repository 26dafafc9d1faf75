//! In-process simulator channel.
//!
//! The CPU core substitutes for the physical counterpart: a worker thread
//! consumes command frames and pushes response and notification frames
//! into the same event stream a socket connection would, so the protocol
//! layer cannot tell the difference. Responses are synchronous per
//! command; `Continue` acknowledges immediately and reports the eventual
//! stop through a pause notification.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use z80_core::{
    deserialize, serialize, Cpu, FlatMemory, MemoryBus, ADDRESS_SPACE_BYTES, ATTR_READ_WATCH,
    ATTR_WRITE_WATCH, HALT_OPCODE, SERIALIZED_STATE_BYTES,
};

use crate::commands::{encode_stop_notification, StopReason, PROGRAM_VERSION};
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::frame::{CommandCode, Frame, STATUS_OK, STATUS_REJECTED, STATUS_UNKNOWN_COMMAND};
use crate::transport::{LinkEvent, Transport};

/// Transport backed by an owned CPU core and memory image.
pub struct SimTransport {
    commands: Option<Sender<Frame>>,
    pause_flag: Arc<AtomicBool>,
    done: std::sync::Mutex<Receiver<()>>,
    disconnect_grace: Duration,
}

impl std::fmt::Debug for SimTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimTransport")
            .field("connected", &self.commands.is_some())
            .finish_non_exhaustive()
    }
}

impl SimTransport {
    /// Starts a simulator session over a zero-filled memory image.
    #[must_use]
    pub fn new(config: &SessionConfig) -> (Self, Receiver<LinkEvent>) {
        Self::with_memory(config, FlatMemory::new())
    }

    /// Starts a simulator session over a caller-prepared memory image.
    ///
    /// The image carries the program bytes and any watch attributes; the
    /// watchpoint group commands toggle whether those attributes are
    /// checked during execution.
    #[must_use]
    pub fn with_memory(config: &SessionConfig, memory: FlatMemory) -> (Self, Receiver<LinkEvent>) {
        let (command_tx, command_rx) = std::sync::mpsc::channel();
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let pause_flag = Arc::new(AtomicBool::new(false));

        let worker = SimWorker {
            cpu: Cpu::new(config.timing),
            memory,
            breakpoints: HashMap::new(),
            next_breakpoint_id: 1,
            watchpoints_enabled: false,
            pause: Arc::clone(&pause_flag),
            events: event_tx,
        };
        drop(std::thread::spawn(move || {
            worker.run(&command_rx);
            let _ = done_tx.send(());
        }));

        (
            Self {
                commands: Some(command_tx),
                pause_flag,
                done: std::sync::Mutex::new(done_rx),
                disconnect_grace: config.disconnect_grace,
            },
            event_rx,
        )
    }
}

impl Transport for SimTransport {
    fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let Some(commands) = &self.commands else {
            return Err(TransportError::ConnectionClosed);
        };
        // Pause must interrupt a running worker, so it is flagged
        // out-of-band before the frame is queued behind the run loop.
        if frame.code == CommandCode::Pause.as_u8() {
            self.pause_flag.store(true, Ordering::SeqCst);
        }
        commands
            .send(frame.clone())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn disconnect(&mut self) {
        if self.commands.take().is_some() {
            self.pause_flag.store(true, Ordering::SeqCst);
            if let Ok(done) = self.done.lock() {
                let _ = done.recv_timeout(self.disconnect_grace);
            }
        }
    }

    fn supports_watchpoints(&self) -> bool {
        true
    }

    fn supports_state_files(&self) -> bool {
        true
    }

    fn kind(&self) -> &'static str {
        "simulator"
    }
}

/// Memory view that records the first watched access of an instruction.
struct WatchBus<'a> {
    memory: &'a mut FlatMemory,
    enabled: bool,
    hit: Cell<Option<u16>>,
}

impl WatchBus<'_> {
    fn record(&self, addr: u16, mask: u8) {
        if self.enabled && self.hit.get().is_none() && self.memory.attrs(addr) & mask != 0 {
            self.hit.set(Some(addr));
        }
    }
}

impl MemoryBus for WatchBus<'_> {
    fn read8(&self, addr: u16) -> u8 {
        self.record(addr, ATTR_READ_WATCH);
        self.memory.read8(addr)
    }

    fn write8(&mut self, addr: u16, value: u8) {
        self.record(addr, ATTR_WRITE_WATCH);
        self.memory.write8(addr, value);
    }
}

struct SimWorker {
    cpu: Cpu,
    memory: FlatMemory,
    breakpoints: HashMap<u16, u16>,
    next_breakpoint_id: u16,
    watchpoints_enabled: bool,
    pause: Arc<AtomicBool>,
    events: Sender<LinkEvent>,
}

impl SimWorker {
    fn run(mut self, commands: &Receiver<Frame>) {
        while let Ok(frame) = commands.recv() {
            self.handle(&frame);
        }
    }

    fn respond(&self, seq: u8, status: u8, args: Vec<u8>) {
        let _ = self.events.send(LinkEvent::Frame(Frame::new(seq, status, args)));
    }

    fn reject(&self, seq: u8, message: &str) {
        self.respond(seq, STATUS_REJECTED, message.as_bytes().to_vec());
    }

    fn notify_stop(&self, reason: &StopReason) {
        let _ = self
            .events
            .send(LinkEvent::Frame(encode_stop_notification(reason)));
    }

    fn handle(&mut self, frame: &Frame) {
        let Some(code) = CommandCode::from_u8(frame.code) else {
            self.respond(
                frame.seq,
                STATUS_UNKNOWN_COMMAND,
                format!("unknown command code {:#04x}", frame.code).into_bytes(),
            );
            return;
        };
        match code {
            CommandCode::Init => self.respond(frame.seq, STATUS_OK, PROGRAM_VERSION.to_vec()),
            CommandCode::Close => self.respond(frame.seq, STATUS_OK, Vec::new()),
            CommandCode::GetRegisters => {
                let mut image = Vec::with_capacity(30);
                for slot in self.cpu.regs().wire_registers() {
                    image.extend_from_slice(&slot.to_le_bytes());
                }
                self.respond(frame.seq, STATUS_OK, image);
            }
            CommandCode::SetRegister => match frame.args.as_slice() {
                [slot, lo, hi] => {
                    let value = u16::from_le_bytes([*lo, *hi]);
                    if self.cpu.regs_mut().set_wire_register(*slot, value) {
                        self.respond(frame.seq, STATUS_OK, Vec::new());
                    } else {
                        self.reject(frame.seq, "invalid register slot or value");
                    }
                }
                _ => self.reject(frame.seq, "set-register expects slot and 16-bit value"),
            },
            CommandCode::ReadMemory => match frame.args.as_slice() {
                [addr_lo, addr_hi, len_lo, len_hi] => {
                    let addr = u16::from_le_bytes([*addr_lo, *addr_hi]);
                    let len = u16::from_le_bytes([*len_lo, *len_hi]);
                    let mut bytes = Vec::with_capacity(usize::from(len));
                    let mut cursor = addr;
                    for _ in 0..len {
                        bytes.push(self.memory.read8(cursor));
                        cursor = cursor.wrapping_add(1);
                    }
                    self.respond(frame.seq, STATUS_OK, bytes);
                }
                _ => self.reject(frame.seq, "memory read expects address and length"),
            },
            CommandCode::WriteMemory => {
                if frame.args.len() < 2 {
                    self.reject(frame.seq, "memory write expects an address");
                    return;
                }
                let addr = u16::from_le_bytes([frame.args[0], frame.args[1]]);
                self.memory.load(addr, &frame.args[2..]);
                self.respond(frame.seq, STATUS_OK, Vec::new());
            }
            CommandCode::AddBreakpoint => match frame.args.as_slice() {
                [lo, hi] => {
                    let addr = u16::from_le_bytes([*lo, *hi]);
                    let id = self.next_breakpoint_id;
                    self.next_breakpoint_id = self.next_breakpoint_id.wrapping_add(1).max(1);
                    let _ = self.breakpoints.insert(id, addr);
                    self.respond(frame.seq, STATUS_OK, id.to_le_bytes().to_vec());
                }
                _ => self.reject(frame.seq, "breakpoint expects a 16-bit address"),
            },
            CommandCode::RemoveBreakpoint => match frame.args.as_slice() {
                [lo, hi] => {
                    let id = u16::from_le_bytes([*lo, *hi]);
                    if self.breakpoints.remove(&id).is_some() {
                        self.respond(frame.seq, STATUS_OK, Vec::new());
                    } else {
                        self.reject(frame.seq, "no breakpoint with that identifier");
                    }
                }
                _ => self.reject(frame.seq, "breakpoint removal expects an identifier"),
            },
            CommandCode::EnableWatchpoints => match frame.args.as_slice() {
                [flag] => {
                    self.watchpoints_enabled = *flag != 0;
                    self.respond(frame.seq, STATUS_OK, Vec::new());
                }
                _ => self.reject(frame.seq, "watchpoint enable expects a flag byte"),
            },
            CommandCode::SaveState => {
                let mut blob = serialize(&self.cpu);
                blob.extend_from_slice(self.memory.bytes());
                self.respond(frame.seq, STATUS_OK, blob);
            }
            CommandCode::RestoreState => {
                if frame.args.len() != SERIALIZED_STATE_BYTES + ADDRESS_SPACE_BYTES {
                    self.reject(frame.seq, "state blob has the wrong length");
                    return;
                }
                match deserialize(&mut self.cpu, &frame.args[..SERIALIZED_STATE_BYTES]) {
                    Ok(()) => {
                        let _ = self.memory.restore(&frame.args[SERIALIZED_STATE_BYTES..]);
                        self.respond(frame.seq, STATUS_OK, Vec::new());
                    }
                    Err(err) => self.reject(frame.seq, &err.to_string()),
                }
            }
            CommandCode::Continue => match parse_continue_args(&frame.args) {
                Some(temporaries) => {
                    self.respond(frame.seq, STATUS_OK, Vec::new());
                    self.run_until_stop(temporaries);
                }
                None => self.reject(frame.seq, "continue expects two optional breakpoints"),
            },
            CommandCode::Pause => {
                // Either consumed here while stopped, or the run loop has
                // already seen the flag and returned; both paths end here.
                self.pause.store(false, Ordering::SeqCst);
                self.respond(frame.seq, STATUS_OK, Vec::new());
                self.notify_stop(&StopReason::Pause);
            }
        }
    }

    fn run_until_stop(&mut self, temporaries: [Option<u16>; 2]) {
        loop {
            if self.pause.load(Ordering::SeqCst) {
                // The queued pause frame acknowledges and notifies.
                return;
            }

            let hit = {
                let mut bus = WatchBus {
                    memory: &mut self.memory,
                    enabled: self.watchpoints_enabled,
                    hit: Cell::new(None),
                };
                match self.cpu.execute(&mut bus, &mut ()) {
                    Ok(_) => bus.hit.get(),
                    Err(err) => {
                        // Fatal to execution: state stays exactly as of the
                        // last fully executed instruction.
                        self.notify_stop(&StopReason::Error {
                            message: err.to_string(),
                        });
                        return;
                    }
                }
            };
            if let Some(addr) = hit {
                self.notify_stop(&StopReason::Watchpoint { addr });
                return;
            }

            let pc = self.cpu.regs().pc();
            if temporaries.contains(&Some(pc)) || self.breakpoints.values().any(|&addr| addr == pc)
            {
                self.notify_stop(&StopReason::Breakpoint { addr: pc });
                return;
            }

            if self.memory.read8(pc) == HALT_OPCODE && !self.cpu.regs().iff1() {
                // HALT with interrupts disabled can never resume.
                self.notify_stop(&StopReason::Halt);
                return;
            }
        }
    }
}

fn parse_continue_args(args: &[u8]) -> Option<[Option<u16>; 2]> {
    if args.len() != 6 {
        return None;
    }
    let mut temporaries = [None, None];
    for (index, chunk) in args.chunks_exact(3).enumerate() {
        temporaries[index] = match chunk[0] {
            0 => None,
            _ => Some(u16::from_le_bytes([chunk[1], chunk[2]])),
        };
    }
    Some(temporaries)
}

#[cfg(test)]
mod tests {
    use super::parse_continue_args;

    #[test]
    fn continue_args_decode_both_optional_breakpoints() {
        assert_eq!(
            parse_continue_args(&[1, 0x00, 0x80, 0, 0, 0]),
            Some([Some(0x8000), None])
        );
        assert_eq!(
            parse_continue_args(&[0, 0, 0, 1, 0x34, 0x12]),
            Some([None, Some(0x1234)])
        );
        assert_eq!(parse_continue_args(&[0, 0, 0]), None);
    }
}
