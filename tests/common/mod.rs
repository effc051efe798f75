//! Scripted in-memory engine shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

use dht_session::registry::Descriptor;
use dht_session::{
    Address, Engine, EngineEvent, EngineHost, Error, Id, NodeCounts, PeerRecord, Protocol,
};

static SERIAL: Mutex<()> = Mutex::new(());

/// Sessions hold a process wide lease, tests constructing them take turns.
///
/// Also routes session logs to the test output.
pub fn serial() -> MutexGuard<'static, ()> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();

    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct EngineLog {
    pub init: Option<(Option<Descriptor>, Option<Descriptor>, Id, [u8; 4])>,
    pub pings: Vec<Address>,
    pub inserted: Vec<PeerRecord>,
    pub searches: Vec<(Id, u16, Protocol)>,
    pub datagrams: Vec<(Vec<u8>, Address)>,
    pub ticks: usize,
    pub shutdown: bool,
    /// Routing table reported by the snapshot operations.
    pub table: Vec<PeerRecord>,
    pub next_wake: Duration,
    /// Raised on the next feed.
    pub pending_events: Vec<EngineEvent>,
    /// Sent on the next feed, through the descriptor of the given family.
    pub pending_sends: Vec<(Protocol, Vec<u8>, Address)>,
    /// Sent on the next feed, through a raw descriptor.
    pub raw_sends: Vec<(Descriptor, Vec<u8>, Vec<u8>)>,
    pub send_results: Vec<io::Result<usize>>,
    /// Reply `pong` to every datagram.
    pub echo: bool,
    pub fail_init: bool,
}

impl Default for EngineLog {
    fn default() -> Self {
        Self {
            init: None,
            pings: vec![],
            inserted: vec![],
            searches: vec![],
            datagrams: vec![],
            ticks: 0,
            shutdown: false,
            table: vec![],
            next_wake: Duration::from_secs(1),
            pending_events: vec![],
            pending_sends: vec![],
            raw_sends: vec![],
            send_results: vec![],
            echo: false,
            fail_init: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    pub log: Rc<RefCell<EngineLog>>,
    v4: Option<Descriptor>,
    v6: Option<Descriptor>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, Rc<RefCell<EngineLog>>) {
        let engine = Self::default();
        let log = engine.log.clone();
        (engine, log)
    }

    fn descriptor(&self, protocol: Protocol) -> Descriptor {
        match protocol {
            Protocol::V4 => self.v4.unwrap_or(-1),
            Protocol::V6 => self.v6.unwrap_or(-1),
        }
    }

    fn flush(&mut self, host: &mut dyn EngineHost) {
        let sends: Vec<_> = self.log.borrow_mut().pending_sends.drain(..).collect();
        for (protocol, data, target) in sends {
            let native = target.to_native().unwrap();
            let result = host.send(self.descriptor(protocol), &data, &native);
            self.log.borrow_mut().send_results.push(result);
        }

        let raw: Vec<_> = self.log.borrow_mut().raw_sends.drain(..).collect();
        for (descriptor, data, native) in raw {
            let result = host.send(descriptor, &data, &native);
            self.log.borrow_mut().send_results.push(result);
        }

        let events: Vec<_> = self.log.borrow_mut().pending_events.drain(..).collect();
        for event in events {
            host.on_event(event);
        }
    }
}

impl Engine for ScriptedEngine {
    fn init(
        &mut self,
        v4: Option<Descriptor>,
        v6: Option<Descriptor>,
        id: &Id,
        version: [u8; 4],
    ) -> dht_session::Result<()> {
        let mut log = self.log.borrow_mut();
        if log.fail_init {
            return Err(Error::Engine("scripted failure".to_string()));
        }

        self.v4 = v4;
        self.v6 = v6;
        log.init = Some((v4, v6, *id, version));
        Ok(())
    }

    fn feed(
        &mut self,
        host: &mut dyn EngineHost,
        datagram: Option<(&[u8], &Address)>,
    ) -> Duration {
        let echo = {
            let mut log = self.log.borrow_mut();
            match datagram {
                Some((data, from)) => {
                    log.datagrams.push((data.to_vec(), *from));
                    log.echo.then_some(*from)
                }
                None => {
                    log.ticks += 1;
                    None
                }
            }
        };

        if let Some(from) = echo {
            if let Some(protocol) = from.protocol() {
                self.log
                    .borrow_mut()
                    .pending_sends
                    .push((protocol, b"pong".to_vec(), from));
            }
        }

        self.flush(host);
        self.log.borrow().next_wake
    }

    fn ping(&mut self, _host: &mut dyn EngineHost, address: &Address) {
        self.log.borrow_mut().pings.push(*address);
    }

    fn insert_node(&mut self, _host: &mut dyn EngineHost, id: &Id, address: &Address) {
        self.log
            .borrow_mut()
            .inserted
            .push(PeerRecord::new(*id, *address));
    }

    fn start_search(&mut self, _host: &mut dyn EngineHost, key: &Id, port: u16, protocol: Protocol) {
        self.log.borrow_mut().searches.push((*key, port, protocol));
    }

    fn snapshot_counts(&self, protocol: Protocol) -> NodeCounts {
        let count = self
            .log
            .borrow()
            .table
            .iter()
            .filter(|peer| peer.address.protocol() == Some(protocol))
            .count();

        NodeCounts {
            good: count / 2,
            dubious: count - count / 2,
            cached: 0,
            incoming: 0,
        }
    }

    fn fetch_snapshot(&self, protocol: Protocol, max: usize) -> Vec<PeerRecord> {
        self.log
            .borrow()
            .table
            .iter()
            .filter(|peer| peer.address.protocol() == Some(protocol))
            .take(max)
            .cloned()
            .collect()
    }

    fn shutdown(&mut self) {
        self.log.borrow_mut().shutdown = true;
    }
}

pub fn peer(byte: u8, address: &str) -> PeerRecord {
    PeerRecord::new(Id([byte; 20]), Address::parse(address).unwrap())
}
