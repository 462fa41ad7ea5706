//! `lumen` drives a single ArtNet DMX universe of stage lights.
//!
//! Lighting programs are loaded from a CSV table of on/off channel masks and scaled by a
//! configurable light power. Programs can be applied instantly or faded to, and a set of
//! screensaver modes animate the lights while nobody is using them.
//!
//! # Structure
//!
//! A single controller task owns the current universe and the ArtNet transmitter. The
//! [`engine::Engine`] facade, the screensaver modes and the control server all talk to it through
//! a cloneable [`controller::ControllerHandle`].

#[macro_use]
extern crate tracing;

pub mod artnet;
pub mod controller;
pub mod engine;
pub mod models;
pub mod programs;
pub mod screensaver;
pub mod servers;
pub mod settings;
pub mod transition;
pub mod universe;
