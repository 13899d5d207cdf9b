//! `statsd-aggregate` is a StatsD/DogStatsD aggregation engine: it ingests
//! UDP datagrams carrying metric samples in the StatsD text protocol,
//! aggregates them in memory by metric type over a fixed flush interval,
//! and emits derived time-series points to a downstream [`EgressSink`] for
//! a consumer to forward onward (e.g. to a TSDB).
//!
//! ### Example: wiring the engine up by hand
//!
//! ```no_run
//! use std::sync::Arc;
//! use statsd_aggregate::{Aggregator, ChannelSink, Engine, StatsdConfig, UdpListener};
//!
//! let config = StatsdConfig::from_env();
//! let (sink, receiver) = ChannelSink::unbounded();
//! let engine = Engine::start(config, Arc::new(sink));
//! let listener = UdpListener::bind("127.0.0.1:8125", Arc::clone(engine.aggregator()))
//!     .expect("failed to bind UDP socket");
//!
//! std::thread::spawn(move || {
//!     for point in receiver.iter() {
//!         println!("{} = {} @ {}", point.name, point.value, point.timestamp);
//!     }
//! });
//!
//! // ... run until shutdown signal ...
//! drop(listener);
//! engine.shutdown();
//! ```
//!
//! # Protocol
//!
//! One UDP datagram carries one or more newline-separated lines, each of
//! shape `key[#tag,...]:value|type[|@rate][:value|type[|@rate]]...`. See
//! [`parse`] for the full grammar and [`aggregator::Aggregator::handle`]
//! for the entry point a UDP receive loop calls per datagram.
//!
//! # Aggregation model
//!
//! Four typed maps (counters, gauges, timers, sets) plus a `keys_seen`
//! metadata map live behind one mutex inside [`Aggregator`]. A background
//! [`flush::FlushEngine`] wakes every `flush_time` seconds, takes that
//! lock once, and emits one [`queue::EgressPoint`] per derived metric —
//! counter rate/count, gauge value, timer percentile summary, set
//! cardinality — before resetting the accumulators for the next window.
//! [`Engine`] wires the aggregator, flush thread, and gauge persistence
//! together; it's the type most callers construct directly.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod flush;
pub mod orchestrator;
pub mod parse;
pub mod persist;
pub mod queue;
pub mod sanitize;
pub mod tags;
pub mod udp;

pub use aggregator::Aggregator;
pub use config::StatsdConfig;
pub use error::GaugePersistError;
pub use flush::FlushEngine;
pub use orchestrator::Engine;
pub use persist::GaugePersister;
pub use queue::{ChannelSink, EgressPoint, EgressSink};
pub use sanitize::SanitizedKey;
pub use tags::Tags;
pub use udp::UdpListener;
