#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

pub mod bcast;
pub mod feedback;
pub mod loco;
pub mod station;
pub mod turnout;
