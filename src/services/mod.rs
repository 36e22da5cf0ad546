//! Application services: workflows that span several stores or reach
//! outside the process.

pub mod accounts;
pub mod ai;
pub mod email;
pub mod events;
pub mod orders;
pub mod payments;
pub mod recommendations;
pub mod vnpay;
