//! # Architecture Abstraction Layer
//!
//! Timer ports for concrete targets. Currently implements the Cortex-M4
//! SysTick port; other targets add a sibling module implementing
//! [`TimerPort`](crate::timer::TimerPort).

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
