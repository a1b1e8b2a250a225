//! Domain model: courses, payments, enrollment outcomes and the ports the
//! application layer talks through.

pub mod course;
pub mod enrollment;
pub mod payment;
pub mod ports;
