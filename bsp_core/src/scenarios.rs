//! End-to-end behavior of the trap dispatcher, interrupt controller and drivers together on the
//! simulated board.

use std::vec::Vec;

use core::sync::atomic::{AtomicUsize, Ordering};

use rand::{seq::SliceRandom, Rng};
use test_case::test_case;

use crate::{
    exceptions::{
        interrupt::{
            source, Config, Controller, ExternalController, Handler, Id, ReceiveBuffer,
            ReceiveCompletion, SourceHandler, TriggerMode,
        },
        trap::{Dispatcher, Vector},
        TrapCause,
    },
    platform::{
        console::{Console, EXIT_TOKEN},
        spi::{Spi, SpiConfig},
        uart::{Uart, UartConfig},
    },
    sim::{self, Event},
};

const EXTERNAL: u32 = 0x8000_000b;
const RETURN_ADDRESS: usize = 0x2000_0400;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Take an external interrupt if the controller is presenting one.
fn poll(board: &sim::Board, dispatcher: &Dispatcher) {
    if board.interrupt_asserted() {
        let resume = dispatcher
            .dispatch(TrapCause::from_raw(EXTERNAL), RETURN_ADDRESS)
            .unwrap();
        assert_eq!(resume, RETURN_ADDRESS);
    }
}

fn assert_claims_paired(events: &[Event]) {
    assert_eq!(events.len() % 2, 0, "unpaired claim in {events:?}");
    for pair in events.chunks(2) {
        match pair {
            [Event::Claim(a), Event::Complete(b)] => assert_eq!(a, b),
            _ => panic!("protocol violation in {events:?}"),
        }
    }
}

#[test]
fn receive_threshold_drains_in_batches() {
    init_logging();
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    let uart = Uart::new(&board);
    uart.init(&UartConfig::default()).unwrap();
    controller.configure(
        source::UART,
        &Config {
            priority: 7,
            mode: TriggerMode::Level,
        },
    );
    controller.set_threshold(0);
    controller.enable(source::UART);
    uart.channel().set_rx_irq(true, 4);

    let buffer = ReceiveBuffer::<u8, 16>::new();
    let completion = ReceiveCompletion::new(*uart.channel(), buffer.writer().unwrap());
    let mut handler = Handler::new(&controller);
    handler.register(source::UART, &completion).unwrap();
    let dispatcher = Dispatcher::new(Vector::new().with_external(&handler));

    let payload: Vec<u8> = (0..16).map(|_| rand::random()).collect();
    for unit in &payload {
        assert!(board.peer_send(sim::Channel::Uart, u32::from(*unit)));
        poll(&board, &dispatcher);
        // every drain moves exactly one threshold's worth
        assert_eq!(buffer.count(), 4 * completion.completions());
    }

    assert_eq!(completion.completions(), 4);
    assert_eq!(buffer.received(), &payload[..]);
    assert_eq!(buffer.dropped(), 0);
    assert_eq!(board.channel_rx_len(sim::Channel::Uart), 0);

    let events = board.events();
    assert_claims_paired(&events);
    assert_eq!(events.len(), 8);
}

#[test]
fn spi_loopback_receives_by_interrupt() {
    init_logging();
    let board = sim::Board::new();
    board.set_wire(sim::Channel::Spi0, sim::Wire::Loopback);
    let controller = ExternalController::new(&board);
    let spi = Spi::spi0(&board);
    spi.init(
        &SpiConfig {
            unit_len: 32,
            ..Default::default()
        },
        0x1,
        true,
    )
    .unwrap();
    controller.configure(source::SPI0, &Config { priority: 7, ..Default::default() });
    controller.enable(source::SPI0);
    spi.channel().set_rx_irq(true, 4);

    let buffer = ReceiveBuffer::<u32, 16>::new();
    let completion = ReceiveCompletion::new(*spi.channel(), buffer.writer().unwrap());
    let mut handler = Handler::new(&controller);
    handler.register(source::SPI0, &completion).unwrap();
    let dispatcher = Dispatcher::new(Vector::new().with_external(&handler));

    let payload: Vec<u32> = (0..16).map(|i| 0x1000_0000 * (i % 4) + i).collect();
    for unit in &payload {
        spi.send(core::slice::from_ref(unit));
        poll(&board, &dispatcher);
    }

    assert_eq!(completion.completions(), 4);
    assert_eq!(buffer.received(), &payload[..]);
    assert_eq!(board.transmitted(sim::Channel::Spi0), payload);
}

#[test]
fn unhandled_source_does_not_block_others() {
    init_logging();
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    let uart = Uart::new(&board);
    uart.init(&UartConfig::default()).unwrap();
    for (id, priority) in [(source::UART, 3), (source::TIMER, 5)] {
        controller.configure(id, &Config { priority, ..Default::default() });
        controller.enable(id);
    }
    uart.channel().set_rx_irq(true, 4);

    let buffer = ReceiveBuffer::<u8, 8>::new();
    let completion = ReceiveCompletion::new(*uart.channel(), buffer.writer().unwrap());
    let mut handler = Handler::new(&controller);
    handler.register(source::UART, &completion).unwrap();
    let dispatcher = Dispatcher::new(Vector::new().with_external(&handler));

    // nothing is registered for the timer source
    board.raise(source::TIMER);
    poll(&board, &dispatcher);
    assert!(!board.interrupt_asserted());

    for unit in 1..=4 {
        assert!(board.peer_send(sim::Channel::Uart, unit));
    }
    poll(&board, &dispatcher);

    assert_eq!(buffer.received(), [1, 2, 3, 4]);
    assert_eq!(
        board.events(),
        [
            Event::Claim(source::TIMER),
            Event::Complete(source::TIMER),
            Event::Claim(source::UART),
            Event::Complete(source::UART),
        ]
    );
}

#[test]
fn synchronous_exception_exits_with_cause_plus_one() {
    init_logging();
    let board = sim::Board::new();
    let dispatcher = Dispatcher::new(Vector::new());

    let err = dispatcher
        .dispatch(TrapCause::from_raw(5), RETURN_ADDRESS)
        .unwrap_err();
    Console::new(&board).report_exit(err.exit_code());

    assert_eq!(err.exit_code(), 6);
    assert_eq!(board.console_output(), "\nProgram exited: 6\n");
    assert_eq!(board.scratch_words(), [EXIT_TOKEN]);
}

/// Records which sources it serviced.
struct Counter {
    handled: AtomicUsize,
}

impl SourceHandler for Counter {
    fn handle(&self, _id: Id) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn every_claim_is_completed_with_its_id() {
    init_logging();
    let mut rng = rand::thread_rng();
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    let counter = Counter {
        handled: AtomicUsize::new(0),
    };

    let mut sources: Vec<Id> = (0..16).map(source::gpio).collect();
    sources.shuffle(&mut rng);
    let (registered, unregistered) = sources.split_at(8);

    let mut handler = Handler::new(&controller);
    for &id in registered {
        handler.register(id, &counter).unwrap();
    }
    for &id in registered.iter().chain(unregistered) {
        controller.configure(
            id,
            &Config {
                priority: rng.gen_range(1..8),
                mode: TriggerMode::Edge,
            },
        );
        controller.enable(id);
    }
    let dispatcher = Dispatcher::new(Vector::new().with_external(&handler));

    let mut raised_registered = 0;
    for _ in 0..200 {
        let id = sources[rng.gen_range(0..sources.len())];
        if registered.contains(&id) {
            raised_registered += 1;
        }
        board.raise(id);
        if rng.gen_bool(0.3) {
            poll(&board, &dispatcher);
        }
    }
    poll(&board, &dispatcher);

    assert!(!board.interrupt_asserted());
    let events = board.events();
    assert_claims_paired(&events);
    // raises that land while the same source is already latched merge into one claim
    assert!(counter.handled.load(Ordering::Relaxed) <= raised_registered);
    assert_eq!(
        counter.handled.load(Ordering::Relaxed),
        events
            .iter()
            .filter(|e| matches!(e, Event::Claim(id) if registered.contains(id)))
            .count()
    );
}

#[test_case(5, 1, 1 ; "b at threshold")]
#[test_case(2, 0, 1 ; "b below threshold")]
#[test_case(7, 3, 6 ; "high threshold")]
#[test_case(1, 0, 0 ; "zero threshold")]
fn priority_above_threshold_wins(priority_a: u32, priority_b: u32, threshold: u32) {
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    // a has the higher id so that ties could never explain the outcome
    let (a, b) = (source::gpio(9), source::gpio(2));
    controller.configure(a, &Config { priority: priority_a, ..Default::default() });
    controller.configure(b, &Config { priority: priority_b, ..Default::default() });
    controller.set_threshold(threshold);
    controller.enable(a);
    controller.enable(b);
    board.raise(a);
    board.raise(b);

    assert_eq!(controller.claim(), Some(a));
    controller.complete(a);
    assert_eq!(controller.claim(), None);
    assert!(controller.is_pending(b));
}

#[test]
fn trigger_mode_is_kept_per_source() {
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    controller.configure(source::UART, &Config { priority: 1, mode: TriggerMode::Level });
    controller.configure(source::gpio(1), &Config { priority: 1, mode: TriggerMode::Edge });
    controller.configure(source::SPI0, &Config { priority: 1, mode: TriggerMode::Edge });
    controller.configure(source::SPI0, &Config { priority: 1, mode: TriggerMode::Level });

    assert_eq!(board.trigger(source::UART), 0);
    assert_eq!(board.trigger(source::SPI0), 0);
    assert_eq!(board.trigger(source::gpio(1)), 1);
    assert_eq!(board.trigger(source::gpio(2)), 0);
}

#[test]
fn equal_priorities_go_to_lowest_id() {
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    for id in [source::WATCHDOG, source::I2C, source::SPI1] {
        controller.configure(id, &Config { priority: 4, ..Default::default() });
        controller.enable(id);
        board.raise(id);
    }

    let mut order = Vec::new();
    while let Some(id) = controller.claim() {
        order.push(id);
        controller.complete(id);
    }
    assert_eq!(order, [source::SPI1, source::I2C, source::WATCHDOG]);
}

#[test]
fn claimed_source_is_not_presented_again_until_completed() {
    let board = sim::Board::new();
    let controller = ExternalController::new(&board);
    controller.configure(source::I2C, &Config { priority: 1, ..Default::default() });
    controller.enable(source::I2C);

    board.raise(source::I2C);
    assert_eq!(controller.claim(), Some(source::I2C));
    board.raise(source::I2C);
    assert_eq!(controller.claim(), None);
    controller.complete(source::I2C);
    assert_eq!(controller.claim(), Some(source::I2C));
    controller.complete(source::I2C);
}
