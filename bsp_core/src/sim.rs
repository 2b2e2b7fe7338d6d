//! A simulated board for host tests.
//!
//! Implements [`Bus`] over an in-memory model of the parts of the SoC that have behavior beyond
//! plain storage: the queue channels of the UART, SPI and I2C controllers, the external interrupt
//! controller and the scratch console. Every other address behaves like RAM.

use std::{
    collections::{HashMap, VecDeque},
    string::String,
    vec::Vec,
};

use spin::Mutex;

use crate::{
    exceptions::interrupt::{source, Id, EXT_IRQ_NUM},
    platform::{
        fifo::{IrqFlags, Layout, SPI_LAYOUT, UART_LAYOUT},
        memory_map,
        mmio::{Bus, Width},
        slc_regs,
    },
};

/// Capacity of every simulated hardware queue.
pub const QUEUE_CAPACITY: usize = 8;

/// Offsets of the interrupt controller registers inside the system controller.
mod ic_regs {
    pub const CLAIM: usize = 0x038;
    pub const THRESHOLD: usize = 0x03c;
    pub const PENDING: usize = 0x040;
    pub const ENABLE: usize = 0x048;
    pub const PRIORITY: usize = 0x050;
    pub const TRIGGER: usize = 0x150;
}

/// A queue channel of the board.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    Uart,
    Spi0,
    Spi1,
    I2c,
}

impl Channel {
    const ALL: [Channel; 4] = [Channel::Uart, Channel::Spi0, Channel::Spi1, Channel::I2c];

    fn base(self) -> usize {
        match self {
            Channel::Uart => memory_map::UART_BASE,
            Channel::Spi0 => memory_map::SPI0_BASE,
            Channel::Spi1 => memory_map::SPI1_BASE,
            Channel::I2c => memory_map::I2C_BASE,
        }
    }

    fn layout(self) -> &'static Layout {
        match self {
            Channel::Uart => &UART_LAYOUT,
            _ => &SPI_LAYOUT,
        }
    }

    fn source(self) -> Id {
        match self {
            Channel::Uart => source::UART,
            Channel::Spi0 => source::SPI0,
            Channel::Spi1 => source::SPI1,
            Channel::I2c => source::I2C,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// What happens to units written to a channel's transmit queue.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Wire {
    /// They wait in the transmit queue until the peer drains them.
    #[default]
    Hold,
    /// They are transmitted immediately and come straight back into the receive queue.
    Loopback,
    /// They are transmitted immediately.
    Sink,
}

/// A step of the claim/complete protocol, in the order it happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Event {
    Claim(Id),
    Complete(Id),
}

#[derive(Default)]
struct ChannelState {
    tx: VecDeque<u32>,
    rx: VecDeque<u32>,
    ie: IrqFlags,
    tx_threshold: u32,
    rx_threshold: u32,
    wire: Wire,
    transmitted: Vec<u32>,
    dropped_tx: usize,
    dropped_rx: usize,
    empty_reads: usize,
}

impl ChannelState {
    fn push_rx(&mut self, unit: u32) -> bool {
        if self.rx.len() < QUEUE_CAPACITY {
            self.rx.push_back(unit);
            true
        } else {
            self.dropped_rx += 1;
            false
        }
    }

    fn push_tx(&mut self, unit: u32) {
        match self.wire {
            _ if self.tx.len() == QUEUE_CAPACITY => self.dropped_tx += 1,
            Wire::Hold => self.tx.push_back(unit),
            Wire::Sink => self.transmitted.push(unit),
            Wire::Loopback => {
                self.transmitted.push(unit);
                self.push_rx(unit);
            }
        }
    }

    /// The conditions of the interrupt pending register, masked by the enables.
    fn pending(&self) -> IrqFlags {
        let mut ip = IrqFlags::default();
        ip.set_transmit(self.ie.transmit() && self.tx.len() as u32 <= self.tx_threshold);
        ip.set_receive(
            self.ie.receive()
                && !self.rx.is_empty()
                && self.rx.len() as u32 >= self.rx_threshold,
        );
        ip
    }
}

struct ControllerState {
    priority: [u32; EXT_IRQ_NUM as usize],
    enable: [u32; 2],
    trigger: [u32; EXT_IRQ_NUM as usize],
    threshold: u32,
    raised: u64,
    claimed: u64,
    events: Vec<Event>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            priority: [0; EXT_IRQ_NUM as usize],
            enable: [0; 2],
            trigger: [0; EXT_IRQ_NUM as usize],
            threshold: 0,
            raised: 0,
            claimed: 0,
            events: Vec::new(),
        }
    }
}

impl ControllerState {
    fn enabled(&self, id: Id) -> bool {
        self.enable[(id / 32) as usize] & (1 << (id % 32)) != 0
    }
}

#[derive(Default)]
struct State {
    channels: [ChannelState; 4],
    controller: ControllerState,
    console: Vec<u8>,
    scratch_words: Vec<u32>,
    memory: HashMap<usize, u32>,
}

impl State {
    fn source_pending(&self, id: Id) -> bool {
        self.controller.raised & (1 << id) != 0
            || Channel::ALL
                .iter()
                .any(|ch| ch.source() == id && self.channels[ch.index()].pending().raw() != 0)
    }

    fn pending_bitmap(&self, word: usize) -> u32 {
        (0..32)
            .filter(|bit| self.source_pending(word as u32 * 32 + bit))
            .fold(0, |acc, bit| acc | (1 << bit))
    }

    /// The source the controller would present right now.
    fn arbitrate(&self) -> Option<Id> {
        let c = &self.controller;
        (0..EXT_IRQ_NUM)
            .filter(|&id| {
                c.enabled(id)
                    && c.claimed & (1 << id) == 0
                    && c.priority[id as usize] > c.threshold
                    && self.source_pending(id)
            })
            // ties go to the lowest id
            .max_by_key(|&id| (c.priority[id as usize], core::cmp::Reverse(id)))
    }

    fn claim(&mut self) -> u32 {
        match self.arbitrate() {
            Some(id) => {
                self.controller.claimed |= 1 << id;
                self.controller.raised &= !(1 << id);
                self.controller.events.push(Event::Claim(id));
                id
            }
            None => EXT_IRQ_NUM,
        }
    }

    fn complete(&mut self, id: u32) {
        if id < EXT_IRQ_NUM {
            self.controller.claimed &= !(1 << id);
        }
        self.controller.events.push(Event::Complete(id));
    }

    fn slc_load(&self, offset: usize) -> Option<u32> {
        let c = &self.controller;
        Some(match offset {
            ic_regs::CLAIM => return None,
            ic_regs::THRESHOLD => c.threshold,
            o if (ic_regs::PENDING..ic_regs::PENDING + 8).contains(&o) => {
                self.pending_bitmap((o - ic_regs::PENDING) / 4)
            }
            o if (ic_regs::ENABLE..ic_regs::ENABLE + 8).contains(&o) => {
                c.enable[(o - ic_regs::ENABLE) / 4]
            }
            o if (ic_regs::PRIORITY..ic_regs::TRIGGER).contains(&o) => {
                c.priority[(o - ic_regs::PRIORITY) / 4]
            }
            o if (ic_regs::TRIGGER..ic_regs::TRIGGER + 4 * EXT_IRQ_NUM as usize).contains(&o) => {
                c.trigger[(o - ic_regs::TRIGGER) / 4]
            }
            _ => return None,
        })
    }

    fn slc_store(&mut self, offset: usize, width: Width, value: u32) -> bool {
        match offset {
            ic_regs::CLAIM => self.complete(value),
            ic_regs::THRESHOLD => self.controller.threshold = value,
            o if (ic_regs::ENABLE..ic_regs::ENABLE + 8).contains(&o) => {
                self.controller.enable[(o - ic_regs::ENABLE) / 4] = value;
            }
            o if (ic_regs::PRIORITY..ic_regs::TRIGGER).contains(&o) => {
                self.controller.priority[(o - ic_regs::PRIORITY) / 4] = value;
            }
            o if (ic_regs::TRIGGER..ic_regs::TRIGGER + 4 * EXT_IRQ_NUM as usize).contains(&o) => {
                self.controller.trigger[(o - ic_regs::TRIGGER) / 4] = value;
            }
            slc_regs::SCRATCH if width == Width::Byte => self.console.push(value as u8),
            slc_regs::SCRATCH => self.scratch_words.push(value),
            _ => return false,
        }
        true
    }
}

/// Decode an address into a channel and an offset inside its register block.
fn channel_at(address: usize) -> Option<(Channel, usize)> {
    Channel::ALL
        .into_iter()
        .find(|ch| (ch.base()..ch.base() + 0x1000).contains(&address))
        .map(|ch| (ch, address - ch.base()))
}

/// The simulated board.
#[derive(Default)]
pub struct Board {
    state: Mutex<State>,
}

impl Board {
    /// A board fresh out of reset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose what happens to units the software transmits on `ch`.
    pub fn set_wire(&self, ch: Channel, wire: Wire) {
        self.state.lock().channels[ch.index()].wire = wire;
    }

    /// The peer puts `unit` on the wire towards `ch`. Returns false if the receive queue was full
    /// and the unit was lost.
    pub fn peer_send(&self, ch: Channel, unit: u32) -> bool {
        self.state.lock().channels[ch.index()].push_rx(unit)
    }

    /// The peer takes up to `max` units from the transmit queue of `ch`.
    pub fn peer_drain(&self, ch: Channel, max: usize) -> usize {
        let mut state = self.state.lock();
        let channel = &mut state.channels[ch.index()];
        let n = max.min(channel.tx.len());
        let units: Vec<u32> = channel.tx.drain(..n).collect();
        channel.transmitted.extend(units);
        n
    }

    /// Everything that left `ch` on the wire, in order.
    pub fn transmitted(&self, ch: Channel) -> Vec<u32> {
        self.state.lock().channels[ch.index()].transmitted.clone()
    }

    /// Units written to a full transmit queue of `ch`.
    pub fn dropped_tx(&self, ch: Channel) -> usize {
        self.state.lock().channels[ch.index()].dropped_tx
    }

    /// Units that arrived at a full receive queue of `ch`.
    pub fn dropped_rx(&self, ch: Channel) -> usize {
        self.state.lock().channels[ch.index()].dropped_rx
    }

    /// Units waiting in the receive queue of `ch`.
    pub fn channel_rx_len(&self, ch: Channel) -> usize {
        self.state.lock().channels[ch.index()].rx.len()
    }

    /// Latch a request on external interrupt source `id` until it is next claimed.
    pub fn raise(&self, id: Id) {
        self.state.lock().controller.raised |= 1 << id;
    }

    /// True while the controller is presenting an external interrupt to the core.
    pub fn interrupt_asserted(&self) -> bool {
        self.state.lock().arbitrate().is_some()
    }

    /// The claim/complete protocol as seen by the controller.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().controller.events.clone()
    }

    /// Raw trigger mode word of source `id`.
    pub fn trigger(&self, id: Id) -> u32 {
        self.state.lock().controller.trigger[id as usize]
    }

    /// Characters written to the console.
    pub fn console_output(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().console).into_owned()
    }

    /// Full words written to the scratch register.
    pub fn scratch_words(&self) -> Vec<u32> {
        self.state.lock().scratch_words.clone()
    }

    fn channel_load(state: &mut State, ch: Channel, offset: usize) -> Option<u32> {
        let layout = ch.layout();
        let channel = &mut state.channels[ch.index()];
        let value = match offset {
            o if o == layout.txq => QUEUE_CAPACITY as u32,
            o if o == layout.txq + 0x4 => channel.tx.len() as u32,
            o if o == layout.rxq => QUEUE_CAPACITY as u32,
            o if o == layout.rxq + 0x4 => channel.rx.len() as u32,
            o if o == layout.rxq + 0xc => channel.rx.pop_front().unwrap_or_else(|| {
                channel.empty_reads += 1;
                0
            }),
            o if o == layout.ie => channel.ie.raw(),
            o if o == layout.ip => channel.pending().raw(),
            o if o == layout.tx_threshold => channel.tx_threshold,
            o if o == layout.rx_threshold => channel.rx_threshold,
            _ => return None,
        };
        Some(value)
    }

    fn channel_store(state: &mut State, ch: Channel, offset: usize, value: u32) -> bool {
        let layout = ch.layout();
        let channel = &mut state.channels[ch.index()];
        match offset {
            o if o == layout.txq + 0x8 => channel.tx.clear(),
            o if o == layout.txq + 0xc => channel.push_tx(value),
            o if o == layout.rxq + 0x8 => channel.rx.clear(),
            o if o == layout.ie => channel.ie = IrqFlags::from_raw(value),
            o if o == layout.tx_threshold => channel.tx_threshold = value,
            o if o == layout.rx_threshold => channel.rx_threshold = value,
            _ => return false,
        }
        true
    }
}

impl Bus for Board {
    fn load(&self, address: usize, width: Width) -> u32 {
        let mut state = self.state.lock();
        let slc = address
            .checked_sub(memory_map::SLC_BASE)
            .filter(|offset| *offset < 0x1000);
        let value = match (slc, channel_at(address)) {
            (Some(ic_regs::CLAIM), _) => Some(state.claim()),
            (Some(offset), _) => state.slc_load(offset),
            (None, Some((ch, offset))) => {
                let before = state.channels[ch.index()].empty_reads;
                let value = Self::channel_load(&mut state, ch, offset);
                if state.channels[ch.index()].empty_reads != before {
                    drop(state);
                    panic!("read of an empty receive queue at 0x{address:x}");
                }
                value
            }
            (None, None) => None,
        };
        let value = value.unwrap_or_else(|| state.memory.get(&address).copied().unwrap_or(0));
        mask(value, width)
    }

    fn store(&self, address: usize, width: Width, value: u32) {
        let mut state = self.state.lock();
        let value = mask(value, width);
        let handled = match address.checked_sub(memory_map::SLC_BASE) {
            Some(offset) if offset < 0x1000 => state.slc_store(offset, width, value),
            _ => false,
        } || channel_at(address)
            .is_some_and(|(ch, offset)| Self::channel_store(&mut state, ch, offset, value));
        if !handled {
            state.memory.insert(address, value);
        }
    }
}

fn mask(value: u32, width: Width) -> u32 {
    match width {
        Width::Byte => value & 0xff,
        Width::Half => value & 0xffff,
        Width::Word => value,
    }
}
