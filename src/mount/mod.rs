//! Mount control core.
//!
//! [`controller::MountController`] owns the [`state::MountState`] and is
//! the only code that mutates it.  The mode FSM ([`fsm`], [`states`])
//! only observes what the controller did, and [`limits`] latches the
//! mechanical faults that gate new motion.

pub mod controller;
pub mod fsm;
pub mod limits;
pub mod state;
pub mod states;
