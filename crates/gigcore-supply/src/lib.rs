pub mod admission;
pub mod decay;
pub mod waitlist;

pub use admission::AdmissionGate;
pub use decay::DecayEngine;
pub use waitlist::WaitlistProcessor;
