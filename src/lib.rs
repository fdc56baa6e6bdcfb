// src/lib.rs

//! `frame-pump` streams synthetic I420 frames into a renderer sink as fast as
//! the sink will take them, under double-buffered flow control.

pub mod cli;
pub mod config;
pub mod flow;
pub mod frame;
pub mod layout;
pub mod pipeline;
pub mod pool;
pub mod session;
pub mod shutdown;
pub mod signals;
pub mod sink;
