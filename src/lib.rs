//! SoleStream carries the readings of a pressure-sensing insole from the
//! shoe to the host.
//!
//! The insole is a grid of force-sensitive resistors scanned through row and
//! column multiplexers. Every cycle the device reads the whole grid, learns
//! or applies a per-node resting baseline, packs the grid into a compact
//! frame and sends it over a radio link whose packets are much smaller than
//! a frame. The host glues the fragments back together, finds frame starts
//! again after a lost fragment, and turns the frame into a grid of
//! resistances, and from there into a `0..=100` pressure scale.
//!
//! Device side: [scanner], [calibration], [frame], [chunker], all driven by
//! [device]. Host side: [reassembler], [decoder] and [sequence], chained by
//! [component]. [simulator] stands in for the hardware, [link] for the radio
//! bridge on a serial port.

#![warn(missing_docs)]
pub mod args;
pub mod calibration;
pub mod chunker;
pub mod component;
pub mod config;
pub mod decoder;
pub mod device;
pub mod frame;
pub mod grid;
pub mod gui;
pub mod link;
pub mod quantize;
pub mod reassembler;
pub mod scanner;
pub mod sequence;
pub mod simulator;
