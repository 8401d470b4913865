//! Wire format and statistics model shared by the loadfleet master and its
//! slave agents.
//!
//! A load test runs concurrently on a fleet of slave nodes. Each slave
//! summarizes its observations into mergeable *sketches* ([`Histogram`],
//! [`Accumulator`], [`ResultsCounter`], [`Uniques`], [`Peak`], [`Rate`]) and
//! periodically ships a snapshot of each one to the master, which merges them
//! into a single view as if the whole test had run on one machine.
//!
//! The crate has three layers:
//!
//! * [`stats`] — the sketch value types and the [`Sketch`] tagged union that
//!   doubles as their wire representation,
//! * [`reportable`] — the interval/cumulative pairing of sketches and the
//!   name-indexed [`Registry`] that routes incoming merges,
//! * [`wire`] — the JSON bodies exchanged over the `/remote` protocol.

mod error;
pub mod reportable;
pub mod stats;
pub mod wire;

pub use error::MergeError;
pub use reportable::{Registry, Reportable};
pub use stats::{
    Accumulator, Histogram, HistogramParams, Peak, Rate, ResultsCounter, Sample, Sketch, Uniques,
};
pub use wire::{StatReport, StatSnapshot, SubmitRequest, TestSpec};
