// Licensed under the Apache-2.0 license

//! Host model of the RP2040 pieces the driver touches, for unit tests.
//!
//! - Scheduler primitives are backed by `std` mutexes and condition variables.
//! - Triggering a TX channel runs the whole transfer against a simple register
//!   pointer device model, fills the RX buffer and latches STOP (or TX_ABRT when no
//!   device answers). The bound interrupt handler then runs inline, or on a helper
//!   thread after the configured latency.
//! - GPIO lines read high unless driven low, or unless a line has been declared
//!   stuck until a number of SCL pulses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use fugit::{HertzU32, MillisDurationU32};

use crate::common::Logger;
use crate::i2c::common::{
    BusId, Direction, PinFunction, BUS_COUNT, DATA_CMD_READ, DATA_CMD_RESTART,
    INTR_STAT_STOP_DET, INTR_STAT_TX_ABRT,
};
use crate::i2c::dma::ChannelConfig;
use crate::i2c::traits::{
    BinarySemaphore, DmaController, GpioControl, I2cRegisters, InterruptControl,
    InterruptHandler, SystemClock, TaskRuntime, TimedMutex,
};

const CHANNEL_COUNT: usize = 12;
const PIN_COUNT: usize = 30;
const DEFAULT_SYS_CLK_HZ: u32 = 125_000_000;

fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_duration(timeout: MillisDurationU32) -> Duration {
    Duration::from_millis(u64::from(timeout.to_millis()))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    IrqEnabled(u16, bool),
    HandlerBound(u16),
    ControllerEnabled(BusId, bool),
    TargetAddress(BusId, u8),
    ControllerInit(BusId, u32),
    InterruptMask(BusId, u32),
    ChannelClaimed(u8),
    ChannelUnclaimed(u8),
    ChannelConfigured(u8, ChannelConfig, bool),
    ChannelAborted(u8),
    PinFunction(u8, PinFunction),
    Yield(bool),
}

/// One transfer as seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockTransfer {
    pub bus: BusId,
    pub address: u8,
    pub commands: Vec<u16>,
}

struct MutexInner {
    locked: Mutex<bool>,
    released: Condvar,
    fail_unlock: AtomicBool,
}

#[derive(Clone)]
pub struct MockMutex {
    inner: Arc<MutexInner>,
}

impl TimedMutex for MockMutex {
    fn lock(&self, timeout: MillisDurationU32) -> bool {
        let guard = lock_state(&self.inner.locked);
        let (mut guard, _) = self
            .inner
            .released
            .wait_timeout_while(guard, to_duration(timeout), |locked| *locked)
            .unwrap_or_else(PoisonError::into_inner);
        if *guard {
            return false;
        }
        *guard = true;
        true
    }

    fn unlock(&self) -> bool {
        *lock_state(&self.inner.locked) = false;
        self.inner.released.notify_one();
        !self.inner.fail_unlock.load(Ordering::SeqCst)
    }
}

struct SemaphoreInner {
    count: Mutex<u32>,
    signalled: Condvar,
    fail_drain: AtomicBool,
}

#[derive(Clone)]
pub struct MockSemaphore {
    inner: Arc<SemaphoreInner>,
}

impl MockSemaphore {
    /// Signal from outside any transfer, like a late completion.
    pub fn give(&self) {
        let _ = self.give_from_isr();
    }

    pub fn pending(&self) -> u32 {
        *lock_state(&self.inner.count)
    }
}

impl BinarySemaphore for MockSemaphore {
    fn take(&self, timeout: MillisDurationU32) -> bool {
        let guard = lock_state(&self.inner.count);
        let (mut count, _) = self
            .inner
            .signalled
            .wait_timeout_while(guard, to_duration(timeout), |count| *count == 0)
            .unwrap_or_else(PoisonError::into_inner);
        if *count == 0 {
            return false;
        }
        *count = 0;
        true
    }

    fn try_take(&self) -> bool {
        if self.inner.fail_drain.load(Ordering::SeqCst) {
            return false;
        }
        let mut count = lock_state(&self.inner.count);
        if *count == 0 {
            return false;
        }
        *count = 0;
        true
    }

    fn count(&self) -> u32 {
        self.pending()
    }

    fn give_from_isr(&self) -> bool {
        *lock_state(&self.inner.count) = 1;
        self.inner.signalled.notify_one();
        true
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MockChannel(u8);

#[derive(Copy, Clone)]
struct BusModel {
    status: u32,
    target: u8,
    stuck: bool,
    in_flight: usize,
    max_in_flight: usize,
    pending_rx: Option<ChannelConfig>,
    irq_enabled: bool,
    handler: Option<InterruptHandler>,
}

const IDLE_BUS: BusModel = BusModel {
    status: 0,
    target: 0,
    stuck: false,
    in_flight: 0,
    max_in_flight: 0,
    pending_rx: None,
    irq_enabled: false,
    handler: None,
};

#[derive(Copy, Clone)]
struct PinModel {
    output: bool,
    latch: bool,
    pulses: u32,
}

const IDLE_PIN: PinModel = PinModel {
    output: false,
    latch: false,
    pulses: 0,
};

struct StuckLine {
    pin: u8,
    scl: u8,
    release_after: Option<u32>,
}

struct MockDevice {
    bus: BusId,
    address: u8,
    pointer: u8,
    registers: [u8; 256],
}

impl MockDevice {
    /// Runs one command stream. The first byte written after a START selects the
    /// register; later bytes store and auto-increment, reads fetch and
    /// auto-increment.
    fn execute(&mut self, commands: &[u16]) -> Vec<u8> {
        let mut selecting = false;
        let mut read = Vec::new();
        for &word in commands {
            if word & DATA_CMD_READ != 0 {
                read.push(self.registers[usize::from(self.pointer)]);
                self.pointer = self.pointer.wrapping_add(1);
                continue;
            }
            if word & DATA_CMD_RESTART != 0 {
                selecting = true;
            }
            let byte = word.to_le_bytes()[0];
            if selecting {
                self.pointer = byte;
                selecting = false;
            } else {
                self.registers[usize::from(self.pointer)] = byte;
                self.pointer = self.pointer.wrapping_add(1);
            }
        }
        read
    }
}

struct MockState {
    events: Vec<MockEvent>,
    mutexes: Vec<MockMutex>,
    semaphores: Vec<MockSemaphore>,
    fail_mutex_create: bool,
    fail_semaphore_create: bool,
    fail_unlock: bool,
    fail_drain: bool,
    buses: [BusModel; BUS_COUNT],
    devices: Vec<MockDevice>,
    transfers: Vec<MockTransfer>,
    claimed: [bool; CHANNEL_COUNT],
    claim_budget: Option<usize>,
    irq_latency: Duration,
    in_flight: usize,
    max_in_flight: usize,
    pins: [PinModel; PIN_COUNT],
    stuck_lines: Vec<StuckLine>,
    sys_clk_hz: u32,
    spins: Vec<u32>,
}

impl MockState {
    /// Executes a triggered TX transfer and returns the handler to run, if any.
    fn run_transfer(
        &mut self,
        bus: BusId,
        commands: Vec<u16>,
    ) -> Option<(InterruptHandler, Duration)> {
        let model = &mut self.buses[bus.index()];
        let rx = model.pending_rx.take();
        let address = model.target;
        model.in_flight += 1;
        model.max_in_flight = model.max_in_flight.max(model.in_flight);
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);

        let device = self
            .devices
            .iter_mut()
            .find(|device| device.bus == bus && device.address == address);
        let stuck = self.buses[bus.index()].stuck;

        if !stuck {
            match device {
                None => {
                    self.buses[bus.index()].status |= INTR_STAT_TX_ABRT | INTR_STAT_STOP_DET;
                }
                Some(device) => {
                    let read = device.execute(&commands);
                    if let Some(rx) = rx {
                        let len = read.len().min(rx.transfer_count as usize);
                        // SAFETY: `write_addr` is the caller's read buffer, which the
                        // driver keeps borrowed until the transfer completes.
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                read.as_ptr(),
                                rx.write_addr as *mut u8,
                                len,
                            );
                        }
                    }
                    self.buses[bus.index()].status |= INTR_STAT_STOP_DET;
                }
            }
        }

        self.transfers.push(MockTransfer {
            bus,
            address,
            commands,
        });

        let model = &self.buses[bus.index()];
        if stuck || !model.irq_enabled {
            return None;
        }
        model.handler.map(|handler| (handler, self.irq_latency))
    }

    fn line_released(&self, pin: u8) -> bool {
        self.stuck_lines
            .iter()
            .filter(|line| line.pin == pin)
            .all(|line| match line.release_after {
                None => false,
                Some(pulses) => self.pins[usize::from(line.scl)].pulses >= pulses,
            })
    }
}

/// Board model for tests. `const` so it can live in a `static` registry.
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                events: Vec::new(),
                mutexes: Vec::new(),
                semaphores: Vec::new(),
                fail_mutex_create: false,
                fail_semaphore_create: false,
                fail_unlock: false,
                fail_drain: false,
                buses: [IDLE_BUS; BUS_COUNT],
                devices: Vec::new(),
                transfers: Vec::new(),
                claimed: [false; CHANNEL_COUNT],
                claim_budget: None,
                irq_latency: Duration::ZERO,
                in_flight: 0,
                max_in_flight: 0,
                pins: [IDLE_PIN; PIN_COUNT],
                stuck_lines: Vec::new(),
                sys_clk_hz: DEFAULT_SYS_CLK_HZ,
                spins: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock_state(&self.state)
    }

    fn push(&self, event: MockEvent) {
        self.state().events.push(event);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    pub fn transfers(&self) -> Vec<MockTransfer> {
        self.state().transfers.clone()
    }

    /// Mutexes in creation order.
    pub fn mutexes(&self) -> Vec<MockMutex> {
        self.state().mutexes.clone()
    }

    /// Semaphores in creation order.
    pub fn semaphores(&self) -> Vec<MockSemaphore> {
        self.state().semaphores.clone()
    }

    pub fn set_fail_mutex_create(&self, fail: bool) {
        self.state().fail_mutex_create = fail;
    }

    pub fn set_fail_semaphore_create(&self, fail: bool) {
        self.state().fail_semaphore_create = fail;
    }

    pub fn set_fail_unlock(&self, fail: bool) {
        let mut state = self.state();
        state.fail_unlock = fail;
        for mutex in &state.mutexes {
            mutex.inner.fail_unlock.store(fail, Ordering::SeqCst);
        }
    }

    pub fn set_fail_drain(&self, fail: bool) {
        let mut state = self.state();
        state.fail_drain = fail;
        for semaphore in &state.semaphores {
            semaphore.inner.fail_drain.store(fail, Ordering::SeqCst);
        }
    }

    pub fn add_device(&self, bus: BusId, address: u8) {
        self.state().devices.push(MockDevice {
            bus,
            address,
            pointer: 0,
            registers: [0; 256],
        });
    }

    fn with_device<T>(&self, bus: BusId, address: u8, f: impl FnOnce(&mut MockDevice) -> T) -> T {
        let mut state = self.state();
        let device = state
            .devices
            .iter_mut()
            .find(|device| device.bus == bus && device.address == address)
            .expect("device not added");
        f(device)
    }

    pub fn set_device_register(&self, bus: BusId, address: u8, register: u8, value: u8) {
        self.with_device(bus, address, |device| {
            device.registers[usize::from(register)] = value;
        });
    }

    pub fn device_register(&self, bus: BusId, address: u8, register: u8) -> u8 {
        self.with_device(bus, address, |device| {
            device.registers[usize::from(register)]
        })
    }

    /// A stuck bus never reports completion.
    pub fn set_stuck(&self, bus: BusId, stuck: bool) {
        self.state().buses[bus.index()].stuck = stuck;
    }

    pub fn set_irq_latency(&self, latency: Duration) {
        self.state().irq_latency = latency;
    }

    /// `Some(n)` allows `n` more claims; `None` removes the limit.
    pub fn set_claim_budget(&self, budget: Option<usize>) {
        self.state().claim_budget = budget;
    }

    pub fn claimed_channels(&self) -> usize {
        self.state().claimed.iter().filter(|claimed| **claimed).count()
    }

    /// Latches STOP_DET without a transfer.
    pub fn raise_stop(&self, bus: BusId) {
        self.state().buses[bus.index()].status |= INTR_STAT_STOP_DET;
    }

    /// Latches TX_ABRT without a transfer.
    pub fn raise_abort(&self, bus: BusId) {
        self.state().buses[bus.index()].status |= INTR_STAT_TX_ABRT;
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    pub fn max_in_flight_on(&self, bus: BusId) -> usize {
        self.state().buses[bus.index()].max_in_flight
    }

    /// SDA reads low until `scl` has been pulsed `release_after` times, or forever.
    pub fn stick_sda(&self, sda: u8, scl: u8, release_after: Option<u32>) {
        self.stick_line(sda, scl, release_after);
    }

    /// Like [`Self::stick_sda`], for any line. SCL may be released by its own pulses.
    pub fn stick_line(&self, pin: u8, scl: u8, release_after: Option<u32>) {
        self.state().stuck_lines.push(StuckLine {
            pin,
            scl,
            release_after,
        });
    }

    pub fn scl_pulses(&self, pin: u8) -> u32 {
        self.state().pins[usize::from(pin)].pulses
    }

    pub fn set_sys_clk_hz(&self, hz: u32) {
        self.state().sys_clk_hz = hz;
    }

    pub fn spins(&self) -> Vec<u32> {
        self.state().spins.clone()
    }

    fn bus_for_irq(irq: u16) -> Option<BusId> {
        BusId::ALL.into_iter().find(|bus| bus.irq_number() == irq)
    }

    const fn data_cmd_address_of(bus: BusId) -> usize {
        0x4004_4010 + bus.index() * 0x4000
    }
}

impl TaskRuntime for MockPlatform {
    type Mutex = MockMutex;
    type Semaphore = MockSemaphore;

    fn create_mutex(&self) -> Option<MockMutex> {
        let mut state = self.state();
        if state.fail_mutex_create {
            return None;
        }
        let mutex = MockMutex {
            inner: Arc::new(MutexInner {
                locked: Mutex::new(false),
                released: Condvar::new(),
                fail_unlock: AtomicBool::new(state.fail_unlock),
            }),
        };
        state.mutexes.push(mutex.clone());
        Some(mutex)
    }

    fn create_binary_semaphore(&self) -> Option<MockSemaphore> {
        let mut state = self.state();
        if state.fail_semaphore_create {
            return None;
        }
        let semaphore = MockSemaphore {
            inner: Arc::new(SemaphoreInner {
                count: Mutex::new(0),
                signalled: Condvar::new(),
                fail_drain: AtomicBool::new(state.fail_drain),
            }),
        };
        state.semaphores.push(semaphore.clone());
        Some(semaphore)
    }

    fn yield_from_isr(&self, higher_priority_woken: bool) {
        self.push(MockEvent::Yield(higher_priority_woken));
    }
}

impl I2cRegisters for MockPlatform {
    fn set_controller_enabled(&self, bus: BusId, enabled: bool) {
        self.push(MockEvent::ControllerEnabled(bus, enabled));
    }

    fn set_target_address(&self, bus: BusId, address: u8) {
        let mut state = self.state();
        state.buses[bus.index()].target = address;
        state.events.push(MockEvent::TargetAddress(bus, address));
    }

    fn enable_controller(&self, bus: BusId, baud_rate: HertzU32) -> HertzU32 {
        let mut state = self.state();
        let model = &mut state.buses[bus.index()];
        let abandoned = model.in_flight;
        model.in_flight = 0;
        model.status = 0;
        model.pending_rx = None;
        state.in_flight -= abandoned;
        state
            .events
            .push(MockEvent::ControllerInit(bus, baud_rate.raw()));
        baud_rate
    }

    fn set_interrupt_mask(&self, bus: BusId, mask: u32) {
        self.push(MockEvent::InterruptMask(bus, mask));
    }

    fn interrupt_status(&self, bus: BusId) -> u32 {
        self.state().buses[bus.index()].status
    }

    fn clear_tx_abort(&self, bus: BusId) {
        self.state().buses[bus.index()].status &= !INTR_STAT_TX_ABRT;
    }

    fn clear_stop_detected(&self, bus: BusId) {
        let mut state = self.state();
        let model = &mut state.buses[bus.index()];
        model.status &= !INTR_STAT_STOP_DET;
        if model.in_flight > 0 {
            model.in_flight -= 1;
            state.in_flight -= 1;
        }
    }

    fn data_cmd_address(&self, bus: BusId) -> usize {
        Self::data_cmd_address_of(bus)
    }

    fn dreq(&self, bus: BusId, direction: Direction) -> u8 {
        let base = 32 + 2 * bus.index() as u8;
        match direction {
            Direction::Transmit => base,
            Direction::Receive => base + 1,
        }
    }
}

impl DmaController for MockPlatform {
    type Channel = MockChannel;

    fn claim_unused_channel(&self) -> Option<MockChannel> {
        let mut state = self.state();
        if state.claim_budget == Some(0) {
            return None;
        }
        let index = state.claimed.iter().position(|claimed| !claimed)?;
        state.claimed[index] = true;
        if let Some(budget) = state.claim_budget.as_mut() {
            *budget -= 1;
        }
        let channel = MockChannel(index as u8);
        state.events.push(MockEvent::ChannelClaimed(channel.0));
        Some(channel)
    }

    fn unclaim_channel(&self, channel: MockChannel) {
        let mut state = self.state();
        state.claimed[usize::from(channel.0)] = false;
        state.events.push(MockEvent::ChannelUnclaimed(channel.0));
    }

    fn configure_channel(&self, channel: MockChannel, config: &ChannelConfig, trigger: bool) {
        let interrupt = {
            let mut state = self.state();
            state
                .events
                .push(MockEvent::ChannelConfigured(channel.0, *config, trigger));

            if let Some(bus) = BusId::ALL
                .into_iter()
                .find(|bus| config.read_addr == Self::data_cmd_address_of(*bus))
            {
                state.buses[bus.index()].pending_rx = Some(*config);
                return;
            }

            let Some(bus) = BusId::ALL
                .into_iter()
                .find(|bus| config.write_addr == Self::data_cmd_address_of(*bus))
            else {
                return;
            };
            if !trigger {
                return;
            }

            // SAFETY: the driver holds the bus lock, so the command buffer is
            // stable for the duration of this call.
            let commands = unsafe {
                std::slice::from_raw_parts(
                    config.read_addr as *const u16,
                    config.transfer_count as usize,
                )
            }
            .to_vec();
            state.run_transfer(bus, commands)
        };

        if let Some((handler, latency)) = interrupt {
            if latency.is_zero() {
                handler();
            } else {
                thread::spawn(move || {
                    thread::sleep(latency);
                    handler();
                });
            }
        }
    }

    fn abort_channel(&self, channel: MockChannel) {
        self.push(MockEvent::ChannelAborted(channel.0));
    }
}

impl GpioControl for MockPlatform {
    fn set_pin_function(&self, pin: u8, function: PinFunction) {
        self.push(MockEvent::PinFunction(pin, function));
    }

    fn set_pin_output(&self, pin: u8, output: bool) {
        let mut state = self.state();
        let model = &mut state.pins[usize::from(pin)];
        if model.output && !output {
            model.pulses += 1;
        }
        model.output = output;
    }

    fn put_pin(&self, pin: u8, high: bool) {
        self.state().pins[usize::from(pin)].latch = high;
    }

    fn read_pin(&self, pin: u8) -> bool {
        let state = self.state();
        let model = state.pins[usize::from(pin)];
        if model.output && !model.latch {
            return false;
        }
        state.line_released(pin)
    }

    fn pull_up_pin(&self, _pin: u8) {}
}

impl InterruptControl for MockPlatform {
    fn set_irq_enabled(&self, irq: u16, enabled: bool) {
        let mut state = self.state();
        if let Some(bus) = Self::bus_for_irq(irq) {
            state.buses[bus.index()].irq_enabled = enabled;
        }
        state.events.push(MockEvent::IrqEnabled(irq, enabled));
    }

    fn set_exclusive_handler(&self, irq: u16, handler: InterruptHandler) {
        let mut state = self.state();
        if let Some(bus) = Self::bus_for_irq(irq) {
            state.buses[bus.index()].handler = Some(handler);
        }
        state.events.push(MockEvent::HandlerBound(irq));
    }
}

impl SystemClock for MockPlatform {
    fn sys_clk_hz(&self) -> u32 {
        self.state().sys_clk_hz
    }

    fn spin_cycles(&self, cycles: u32) {
        self.state().spins.push(cycles);
    }
}

/// Logger that keeps every line, prefixed with its level.
pub struct RecordingLogger {
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub const fn new() -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        lock_state(&self.lines).clone()
    }

    fn record(&self, level: &str, args: core::fmt::Arguments<'_>) {
        lock_state(&self.lines).push(format!("{level} {args}"));
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, args: core::fmt::Arguments<'_>) {
        self.record("DEBUG", args);
    }

    fn warn(&self, args: core::fmt::Arguments<'_>) {
        self.record("WARN", args);
    }

    fn error(&self, args: core::fmt::Arguments<'_>) {
        self.record("ERROR", args);
    }
}
